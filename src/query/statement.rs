//! 语句与语句类别
//!
//! 批次文本按分号切分为有序的已解析语句。解析由 `sqlparser`（PostgreSQL 方言）完成，
//! 整个批次先解析后执行：任何一条语句解析失败都会拒绝整个批次

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::core::error::{DBError, DBResult};
use crate::query::classifier::classify;
use crate::services::MetricName;

/// 语句类别，仅用于指标归属
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementCategory {
    TxnBegin,
    TxnCommit,
    TxnRollback,
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Misc,
}

impl StatementCategory {
    /// 该类别对应的计数器
    pub fn metric(&self) -> MetricName {
        match self {
            StatementCategory::TxnBegin => MetricName::TxnBegin,
            StatementCategory::TxnCommit => MetricName::TxnCommit,
            StatementCategory::TxnRollback => MetricName::TxnRollback,
            StatementCategory::Select => MetricName::Select,
            StatementCategory::Insert => MetricName::Insert,
            StatementCategory::Update => MetricName::Update,
            StatementCategory::Delete => MetricName::Delete,
            StatementCategory::Ddl => MetricName::Ddl,
            StatementCategory::Misc => MetricName::Misc,
        }
    }

    /// 是否为事务控制语句（由状态机处理，不交给执行协作者）
    pub fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            StatementCategory::TxnBegin | StatementCategory::TxnCommit | StatementCategory::TxnRollback
        )
    }
}

impl fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementCategory::TxnBegin => "BEGIN",
            StatementCategory::TxnCommit => "COMMIT",
            StatementCategory::TxnRollback => "ROLLBACK",
            StatementCategory::Select => "SELECT",
            StatementCategory::Insert => "INSERT",
            StatementCategory::Update => "UPDATE",
            StatementCategory::Delete => "DELETE",
            StatementCategory::Ddl => "DDL",
            StatementCategory::Misc => "MISC",
        };
        f.write_str(name)
    }
}

/// 已解析的语句
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    statement: Statement,
    category: StatementCategory,
    sql: String,
}

impl ParsedStatement {
    pub fn new(statement: Statement) -> Self {
        let category = classify(&statement);
        let sql = statement.to_string();
        Self {
            statement,
            category,
            sql,
        }
    }

    /// 解析单条语句
    pub fn parse(sql: &str) -> DBResult<Self> {
        let mut statements = parse_batch(sql)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            n => Err(DBError::Parse(format!("期望一条语句，实际为 {} 条", n))),
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn category(&self) -> StatementCategory {
        self.category
    }

    /// 规范化后的 SQL 文本
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// 把批次切分为有序语句，空批次返回空序列
pub fn parse_batch(batch: &str) -> DBResult<Vec<ParsedStatement>> {
    if batch.trim().is_empty() {
        return Ok(Vec::new());
    }
    let dialect = PostgreSqlDialect {};
    let statements =
        Parser::parse_sql(&dialect, batch).map_err(|e| DBError::Parse(e.to_string()))?;
    Ok(statements.into_iter().map(ParsedStatement::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        assert!(parse_batch("").expect("解析失败").is_empty());
        assert!(parse_batch("   \n\t").expect("解析失败").is_empty());
    }

    #[test]
    fn test_batch_preserves_source_order() {
        let statements = parse_batch("BEGIN; UPDATE t SET c = c + 1; END").expect("解析失败");
        let categories: Vec<_> = statements.iter().map(|s| s.category()).collect();
        assert_eq!(
            categories,
            vec![
                StatementCategory::TxnBegin,
                StatementCategory::Update,
                StatementCategory::TxnCommit
            ]
        );
    }

    #[test]
    fn test_trailing_semicolon() {
        let statements = parse_batch("SELECT 1;").expect("解析失败");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].category(), StatementCategory::Select);
    }

    #[test]
    fn test_malformed_statement_rejects_batch() {
        let result = parse_batch("SELECT 1; SELEC 2");
        assert!(matches!(result, Err(DBError::Parse(_))));
    }

    #[test]
    fn test_parse_single() {
        let stmt = ParsedStatement::parse("INSERT INTO t VALUES (1)").expect("解析失败");
        assert_eq!(stmt.category(), StatementCategory::Insert);
        assert!(ParsedStatement::parse("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn test_category_metric_mapping() {
        assert_eq!(StatementCategory::Select.metric(), MetricName::Select);
        assert_eq!(StatementCategory::TxnCommit.metric(), MetricName::TxnCommit);
        assert!(StatementCategory::TxnRollback.is_transaction_control());
        assert!(!StatementCategory::Misc.is_transaction_control());
    }
}
