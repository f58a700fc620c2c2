// Query module
//
// Batch processing from text to counted execution:
// - Splitting and parsing batches into typed statements
// - Classifying statements into metric categories
// - Dispatching statements through the transaction state machine
// - The execution collaborator interface and its in-memory implementation
// - Row expression evaluation for the in-memory executor

pub mod classifier;
pub mod dispatcher;
pub mod evaluator;
pub mod execution;
pub mod memory_executor;
pub mod statement;

pub use classifier::classify;
pub use dispatcher::{BatchResult, StatementDispatcher, StatementFailure, StatementResult};
pub use execution::{ExecutionOutput, StatementExecutor};
pub use memory_executor::MemoryExecutor;
pub use statement::{parse_batch, ParsedStatement, StatementCategory};
