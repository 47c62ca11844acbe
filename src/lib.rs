// Fraud Scan - Core Library
// Flags possibly fraudulent entries in a bank-transaction history.
// Exposes all modules for use in CLI, API server, and tests

pub mod transaction;
pub mod error;
pub mod normalizer;     // Raw records → Transaction, newest first
pub mod duplicates;     // Duplicate charges
pub mod p2p;            // Large peer-to-peer transfers
pub mod classifier;     // Remote-model suspicious payee classifier
pub mod rules;          // Rule-based suspicious payee classifier
pub mod engine;         // Detection orchestrator
pub mod config;
pub mod source;         // Bank aggregation boundary
pub mod accounts;       // Account store boundary

// Re-export commonly used types
pub use transaction::{
    Transaction, FraudType, PossibleFraudInstance, parse_magnitude, magnitude_at_least,
};
pub use error::DetectionError;
pub use normalizer::{
    RawTransaction,
    import_transactions, parse_record, load_transactions, load_json_records, load_csv_records,
};
pub use duplicates::DuplicateDetector;
pub use p2p::{LargeP2pDetector, DEFAULT_P2P_SERVICES, DEFAULT_P2P_THRESHOLD};
pub use classifier::{
    PayeeClassifier, CompletionClient, LlmPayeeClassifier, OpenAiCompletionClient,
    parse_classifier_response, SYSTEM_PROMPT,
};
pub use rules::{PayeeRule, RuleEngine, RulePayeeClassifier};
pub use engine::{DetectionEngine, DetectionReport, DetectorWarning};
pub use config::{EngineConfig, ClassifierConfig, DetectorConfig};
pub use source::{
    BankDataSource, SimpleFinSource, FixtureSource, AccountSet, RawAccount, AccountSummary,
    summarize_account, exchange_setup_token,
};
pub use accounts::{
    AccountStore, SqliteAccountStore, UserRecord, AuthError,
    authenticate, register_user, hash_password, verify_password,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
