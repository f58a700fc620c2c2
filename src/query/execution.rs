//! 执行协作者接口
//!
//! 分发器不知道结果如何产生，只关心调用是否成功

use serde::{Deserialize, Serialize};

use crate::core::error::ExecutionResult;
use crate::query::statement::{ParsedStatement, StatementCategory};
use crate::storage::TxnHandle;

/// 单条语句的执行输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutput {
    /// 结果集
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// 受影响的行数
    RowsAffected(u64),
    /// 无输出（DDL、SET、事务控制等）
    Ok,
}

impl ExecutionOutput {
    pub fn row_count(&self) -> usize {
        match self {
            ExecutionOutput::Rows { rows, .. } => rows.len(),
            ExecutionOutput::RowsAffected(n) => *n as usize,
            ExecutionOutput::Ok => 0,
        }
    }
}

/// 在给定事务中执行单条语句
pub trait StatementExecutor: Send + Sync {
    fn execute(
        &self,
        category: StatementCategory,
        statement: &ParsedStatement,
        txn: &TxnHandle,
    ) -> ExecutionResult<ExecutionOutput>;
}
