//! Ledger services
//!
//! - [`ChainLinker`]: appends statements to the hash chain and audits it
//! - [`VerificationPipeline`]: oracle judgments on single statements
//! - [`QueryPipeline`]: retrieval-backed question answering

mod chain;
mod query;
mod verification;

pub use chain::ChainLinker;
pub use query::{
    database_summary, keywords, select_from_snapshot, QueryPipeline, RetrievalMode,
    MAX_CANDIDATES, MAX_QUERY_CHARS, SELECTION_SNAPSHOT,
};
pub use verification::{Claim, VerificationPipeline, UNKNOWN_SPEAKER};
