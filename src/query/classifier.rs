//! 语句分类器
//!
//! 按顶层语法产生式归类，而不是按语义效果。EXPLAIN、SET、SHOW 等
//! 元操作归为 `Misc`，被包裹的语句不会单独计数

use sqlparser::ast::Statement;

use crate::query::statement::StatementCategory;

/// 把已解析的语句映射到唯一的类别
pub fn classify(statement: &Statement) -> StatementCategory {
    match statement {
        Statement::StartTransaction { .. } => StatementCategory::TxnBegin,
        Statement::Commit { .. } => StatementCategory::TxnCommit,
        Statement::Rollback { savepoint: None, .. } => StatementCategory::TxnRollback,

        Statement::Query { .. } => StatementCategory::Select,
        Statement::Insert { .. } => StatementCategory::Insert,
        Statement::Update { .. } => StatementCategory::Update,
        Statement::Delete { .. } => StatementCategory::Delete,

        Statement::CreateDatabase { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. } => StatementCategory::Ddl,

        _ => StatementCategory::Misc,
    }
}
