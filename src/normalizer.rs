// 🏗️ Transaction Normalizer
// Raw records (JSON objects / CSV rows) → Transaction, newest first

use crate::error::DetectionError;
use crate::transaction::{parse_magnitude, Transaction};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A raw record: field name → JSON value, straight from the source
pub type RawTransaction = Map<String, Value>;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Parse every raw record strictly and sort by `posted`, newest first.
///
/// The sort is stable, so records sharing a timestamp keep their input order.
pub fn import_transactions(raw: &[Value]) -> Result<Vec<Transaction>, DetectionError> {
    let mut transactions = raw
        .iter()
        .enumerate()
        .map(|(index, value)| parse_value(index, value))
        .collect::<Result<Vec<_>, _>>()?;

    sort_newest_first(&mut transactions);
    Ok(transactions)
}

pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.posted.cmp(&a.posted));
}

fn parse_value(index: usize, value: &Value) -> Result<Transaction, DetectionError> {
    let record = value
        .as_object()
        .ok_or_else(|| DetectionError::invalid(index, "<record>", "is not an object"))?;
    parse_record(index, record)
}

/// Parse one raw record. No field is coerced or defaulted.
pub fn parse_record(index: usize, record: &RawTransaction) -> Result<Transaction, DetectionError> {
    let id = text_field(index, record, "id")?;
    let posted = integer_field(index, record, "posted")?;
    let amount = text_field(index, record, "amount")?;
    let description = text_field(index, record, "description")?;
    let payee = text_field(index, record, "payee")?;
    let memo = text_field(index, record, "memo")?;

    if parse_magnitude(&amount).is_none() {
        return Err(DetectionError::invalid(
            index,
            "amount",
            format!("is not a decimal number: {:?}", amount),
        ));
    }

    Ok(Transaction {
        id,
        posted,
        amount,
        description,
        payee,
        memo,
    })
}

fn text_field(index: usize, record: &RawTransaction, field: &str) -> Result<String, DetectionError> {
    match record.get(field) {
        None => Err(DetectionError::missing(index, field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(DetectionError::invalid(
            index,
            field,
            format!("must be a string, got {}", json_kind(other)),
        )),
    }
}

fn integer_field(index: usize, record: &RawTransaction, field: &str) -> Result<i64, DetectionError> {
    match record.get(field) {
        None => Err(DetectionError::missing(index, field)),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| DetectionError::invalid(index, field, format!("must be an integer, got {}", n))),
        Some(other) => Err(DetectionError::invalid(
            index,
            field,
            format!("must be an integer, got {}", json_kind(other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// FILE LOADERS
// ============================================================================

/// Load raw records from a JSON file.
///
/// Accepts a bare array of transactions or an aggregator document
/// (`{"accounts": [{"transactions": [...]}, ...]}`).
pub fn load_json_records(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let document: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;

    records_from_document(document)
        .with_context(|| format!("Unrecognised transaction document: {}", path.display()))
}

pub fn records_from_document(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut root) => {
            let accounts = match root.remove("accounts") {
                Some(Value::Array(accounts)) => accounts,
                _ => anyhow::bail!("expected an array or an object with an `accounts` array"),
            };

            let mut records = Vec::new();
            for account in accounts {
                if let Some(Value::Array(txs)) = account.get("transactions") {
                    records.extend(txs.iter().cloned());
                }
            }
            Ok(records)
        }
        _ => anyhow::bail!("expected an array or an object with an `accounts` array"),
    }
}

/// Load raw records from a CSV file whose header names the fields.
///
/// Every cell stays text except `posted`, which becomes a JSON integer when
/// it is one; anything else is left for the normalizer to reject.
pub fn load_csv_records(path: &Path) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header in {}", path.display()))?
        .clone();

    let mut records = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let row = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, path.display())
        })?;

        let mut record = RawTransaction::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            let value = match (name, cell.trim().parse::<i64>()) {
                ("posted", Ok(posted)) => Value::from(posted),
                _ => Value::String(cell.to_string()),
            };
            record.insert(name.to_string(), value);
        }
        records.push(Value::Object(record));
    }

    Ok(records)
}

/// Load and normalize a transaction file, picking the loader by extension.
pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let records = if is_csv {
        load_csv_records(path)?
    } else {
        load_json_records(path)?
    };

    let transactions = import_transactions(&records)
        .with_context(|| format!("Failed to import transactions from {}", path.display()))?;
    Ok(transactions)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn raw(id: &str, posted: i64) -> Value {
        json!({
            "id": id,
            "posted": posted,
            "amount": "-10.00",
            "description": "desc",
            "payee": "payee",
            "memo": "memo"
        })
    }

    #[test]
    fn test_sorts_newest_first() {
        let records = vec![raw("a", 100), raw("b", 300), raw("c", 200)];
        let txs = import_transactions(&records).unwrap();

        let posted: Vec<i64> = txs.iter().map(|t| t.posted).collect();
        assert_eq!(posted, vec![300, 200, 100]);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let records = vec![raw("first", 100), raw("second", 100), raw("newer", 500)];
        let txs = import_transactions(&records).unwrap();

        let ids: Vec<&str> = txs.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "first", "second"]);
    }

    #[test]
    fn test_missing_payee_is_malformed() {
        let mut record = raw("a", 100);
        record.as_object_mut().unwrap().remove("payee");

        let err = import_transactions(&[record]).unwrap_err();
        assert!(matches!(err, DetectionError::MalformedInput { .. }));
        assert_eq!(err.field(), Some("payee"));
    }

    #[test]
    fn test_fields_are_not_coerced() {
        let mut record = raw("a", 100);
        record["posted"] = json!("100");
        let err = import_transactions(&[record]).unwrap_err();
        assert_eq!(err.field(), Some("posted"));

        let mut record = raw("a", 100);
        record["memo"] = Value::Null;
        let err = import_transactions(&[record]).unwrap_err();
        assert_eq!(err.field(), Some("memo"));

        let mut record = raw("a", 100);
        record["posted"] = json!(100.5);
        let err = import_transactions(&[record]).unwrap_err();
        assert_eq!(err.field(), Some("posted"));
    }

    #[test]
    fn test_unparsable_amount_is_malformed() {
        let mut record = raw("a", 100);
        record["amount"] = json!("twelve");

        let err = import_transactions(&[record]).unwrap_err();
        assert_eq!(err.field(), Some("amount"));
    }

    #[test]
    fn test_empty_text_fields_are_allowed() {
        let record = json!({
            "id": "a", "posted": 1, "amount": "5", "description": "", "payee": "", "memo": ""
        });
        let txs = import_transactions(&[record]).unwrap();
        assert_eq!(txs[0].payee, "");
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let mut record = raw("a", 100);
        record["pending"] = json!(false);
        record["transacted_at"] = json!(99);

        let txs = import_transactions(&[record]).unwrap();
        assert_eq!(txs.len(), 1);
    }

    #[test]
    fn test_records_from_aggregator_document() {
        let document = json!({
            "errors": [],
            "accounts": [
                {"name": "Checking", "transactions": [raw("a", 1)]},
                {"name": "Savings", "transactions": [raw("b", 2), raw("c", 3)]},
                {"name": "Empty"}
            ]
        });

        let records = records_from_document(document).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records_from_document(json!("nope")).is_err());
    }

    #[test]
    fn test_load_csv_transactions() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,posted,amount,description,payee,memo").unwrap();
        writeln!(file, "a,100,-25.00,Coffee,Cafe X,coffee").unwrap();
        writeln!(file, "b,200,-25.00,Coffee,Cafe X,coffee").unwrap();
        file.flush().unwrap();

        let txs = load_transactions(file.path()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].id, "b");
        assert_eq!(txs[1].payee, "Cafe X");
    }

    #[test]
    fn test_load_csv_missing_column_names_field() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,posted,amount,description,memo").unwrap();
        writeln!(file, "a,100,-25.00,Coffee,coffee").unwrap();
        file.flush().unwrap();

        let records = load_csv_records(file.path()).unwrap();
        let err = import_transactions(&records).unwrap_err();
        assert_eq!(err.field(), Some("payee"));
    }

    #[test]
    fn test_load_json_array() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let body = json!([raw("a", 1), raw("b", 2)]);
        write!(file, "{}", body).unwrap();
        file.flush().unwrap();

        let txs = load_transactions(file.path()).unwrap();
        assert_eq!(txs.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
