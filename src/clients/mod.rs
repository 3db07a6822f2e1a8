pub mod ledger_client;
pub mod progress;
pub mod scan_client;

pub use ledger_client::{CreditLedgerClient, HttpCreditLedger, LedgerReceipt};
pub use progress::{ProgressChannel, ProgressHub, ProgressSubscription, ProgressUpdate};
pub use scan_client::{HttpScanInvoker, PageOutcome, RemoteScanInvoker, ScanResponse};
