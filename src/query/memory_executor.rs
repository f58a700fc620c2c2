//! 内存执行器
//!
//! 执行协作者的参考实现。目录与行数据都保存在事务存储中，DDL 与 DML
//! 一样随事务提交或回滚：
//! - 数据库：`#catalog/db/<名称>`
//! - 表定义：`#catalog/table/<表名>`，值为列名列表的 JSON
//! - 行：`<表名>/<主键>`，值为单元格列表的 JSON，第一列为主键
//!
//! 每条被触及的行都经由存储写入，并发写同一行会触发存储的写冲突

use std::ops::ControlFlow;
use std::sync::Arc;

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    visit_relations, AlterTableOperation, AssignmentTarget, BinaryOperator, Expr, GroupByExpr,
    ObjectName, ObjectType, SelectItem, SetExpr, Statement, TableObject,
};

use crate::core::error::{ExecutionError, ExecutionResult, StoreError};
use crate::query::classifier::classify;
use crate::query::evaluator::{literal_text, RowScope, NULL};
use crate::query::execution::{ExecutionOutput, StatementExecutor};
use crate::query::statement::{ParsedStatement, StatementCategory};
use crate::storage::{TransactionalStore, TxnHandle};

const DATABASE_PREFIX: &str = "#catalog/db/";
const TABLE_PREFIX: &str = "#catalog/table/";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableDef {
    columns: Vec<String>,
}

impl TableDef {
    fn column_index(&self, table: &str, column: &str) -> ExecutionResult<usize> {
        let column = column.to_lowercase();
        self.columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| ExecutionError::ObjectNotFound(format!("列 {}.{} 不存在", table, column)))
    }

    /// 补齐 ADD COLUMN 之前写入的行
    fn widen(&self, mut row: Vec<String>) -> Vec<String> {
        if row.len() < self.columns.len() {
            row.resize(self.columns.len(), NULL.to_string());
        }
        row
    }
}

/// 存储键与解码后的单元格
type Row = (String, Vec<String>);

/// 内存执行器
pub struct MemoryExecutor {
    store: Arc<dyn TransactionalStore>,
}

impl MemoryExecutor {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }

    /// 事务可见的表名（已排序）
    pub fn table_names(&self, txn: &TxnHandle) -> ExecutionResult<Vec<String>> {
        Ok(self
            .store
            .scan_prefix(txn, TABLE_PREFIX)?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(TABLE_PREFIX).map(str::to_string))
            .collect())
    }

    fn table(&self, name: &str, txn: &TxnHandle) -> ExecutionResult<TableDef> {
        match self.store.read(txn, &table_key(name))? {
            Some(value) => from_json(&value),
            None => Err(ExecutionError::ObjectNotFound(format!("表 {} 不存在", name))),
        }
    }

    fn table_exists(&self, name: &str, txn: &TxnHandle) -> ExecutionResult<bool> {
        Ok(self.store.read(txn, &table_key(name))?.is_some())
    }

    fn database_exists(&self, name: &str, txn: &TxnHandle) -> ExecutionResult<bool> {
        Ok(self.store.read(txn, &database_key(name))?.is_some())
    }

    /// 限定名 `db.table` 要求数据库已存在
    fn check_parent(&self, name: &str, txn: &TxnHandle) -> ExecutionResult<()> {
        match name.rsplit_once('.') {
            Some((db, _)) if !self.database_exists(db, txn)? => Err(ExecutionError::ObjectNotFound(
                format!("数据库 {} 不存在", db),
            )),
            _ => Ok(()),
        }
    }

    fn scan_rows(&self, table: &str, def: &TableDef, txn: &TxnHandle) -> ExecutionResult<Vec<Row>> {
        self.store
            .scan_prefix(txn, &row_prefix(table))?
            .into_iter()
            .map(|(key, value)| Ok((key, def.widen(from_json(&value)?))))
            .collect()
    }

    /// 选出满足谓词的行，主键等值谓词只读一个键
    fn matching_rows(
        &self,
        table: &str,
        def: &TableDef,
        selection: Option<&Expr>,
        txn: &TxnHandle,
    ) -> ExecutionResult<Vec<Row>> {
        let candidates = match key_filter(selection, def) {
            Some(pk) => {
                let key = row_key(table, &pk);
                match self.store.read(txn, &key)? {
                    Some(value) => vec![(key, def.widen(from_json(&value)?))],
                    None => Vec::new(),
                }
            }
            None => self.scan_rows(table, def, txn)?,
        };
        let Some(predicate) = selection else {
            return Ok(candidates);
        };

        let mut rows = Vec::new();
        for (key, row) in candidates {
            if RowScope::new(&def.columns, &row).test(predicate)? {
                rows.push((key, row));
            }
        }
        Ok(rows)
    }

    fn delete_rows(&self, table: &str, txn: &TxnHandle) -> ExecutionResult<()> {
        for (key, _) in self.store.scan_prefix(txn, &row_prefix(table))? {
            self.store.delete(txn, &key)?;
        }
        Ok(())
    }

    fn create_database(&self, name: &str, if_not_exists: bool, txn: &TxnHandle) -> ExecutionResult<()> {
        if self.database_exists(name, txn)? {
            if if_not_exists {
                return Ok(());
            }
            return Err(ExecutionError::ObjectAlreadyExists(format!("数据库 {}", name)));
        }
        self.store.write(txn, &database_key(name), "{}".to_string())?;
        Ok(())
    }

    fn drop_object(&self, object_type: &ObjectType, name: &str, txn: &TxnHandle) -> ExecutionResult<bool> {
        match object_type {
            ObjectType::Table => {
                if !self.table_exists(name, txn)? {
                    return Ok(false);
                }
                self.delete_rows(name, txn)?;
                self.store.delete(txn, &table_key(name))?;
                Ok(true)
            }
            ObjectType::Database | ObjectType::Schema => {
                let children: Vec<String> = self
                    .table_names(txn)?
                    .into_iter()
                    .filter(|table| table.starts_with(&format!("{}.", name)))
                    .collect();
                for child in children {
                    self.drop_object(&ObjectType::Table, &child, txn)?;
                }
                if !self.database_exists(name, txn)? {
                    return Ok(false);
                }
                self.store.delete(txn, &database_key(name))?;
                Ok(true)
            }
            // 索引不落盘，CREATE INDEX 只校验表
            ObjectType::Index => Ok(true),
            other => Err(ExecutionError::Unsupported(format!("DROP {}", other))),
        }
    }

    fn execute_ddl(&self, statement: &Statement, txn: &TxnHandle) -> ExecutionResult<ExecutionOutput> {
        match statement {
            Statement::CreateDatabase {
                db_name,
                if_not_exists,
                ..
            } => self.create_database(&object_name(db_name), *if_not_exists, txn)?,
            Statement::CreateSchema {
                schema_name,
                if_not_exists,
                ..
            } => self.create_database(&schema_name.to_string().to_lowercase(), *if_not_exists, txn)?,
            Statement::CreateTable(create) => {
                let name = object_name(&create.name);
                self.check_parent(&name, txn)?;
                if self.table_exists(&name, txn)? {
                    if create.if_not_exists {
                        return Ok(ExecutionOutput::Ok);
                    }
                    return Err(ExecutionError::ObjectAlreadyExists(format!("表 {}", name)));
                }
                if create.columns.is_empty() {
                    return Err(ExecutionError::Unsupported(format!("没有列定义的表 {}", name)));
                }
                let def = TableDef {
                    columns: create
                        .columns
                        .iter()
                        .map(|c| c.name.value.to_lowercase())
                        .collect(),
                };
                self.store.write(txn, &table_key(&name), to_json(&def)?)?;
            }
            Statement::CreateIndex(index) => {
                self.table(&object_name(&index.table_name), txn)?;
            }
            Statement::AlterTable {
                name, operations, ..
            } => {
                let name = object_name(name);
                let mut def = self.table(&name, txn)?;
                for operation in operations {
                    match operation {
                        AlterTableOperation::AddColumn {
                            if_not_exists,
                            column_def,
                            ..
                        } => {
                            let column = column_def.name.value.to_lowercase();
                            if def.columns.contains(&column) {
                                if *if_not_exists {
                                    continue;
                                }
                                return Err(ExecutionError::ObjectAlreadyExists(format!(
                                    "列 {}.{}",
                                    name, column
                                )));
                            }
                            def.columns.push(column);
                        }
                        other => {
                            return Err(ExecutionError::Unsupported(format!("ALTER TABLE {}", other)))
                        }
                    }
                }
                self.store.write(txn, &table_key(&name), to_json(&def)?)?;
            }
            Statement::Drop {
                object_type,
                if_exists,
                names,
                ..
            } => {
                for name in names {
                    let name = object_name(name);
                    if !self.drop_object(object_type, &name, txn)? && !*if_exists {
                        return Err(ExecutionError::ObjectNotFound(format!(
                            "{} {} 不存在",
                            object_type, name
                        )));
                    }
                }
            }
            Statement::Truncate { table_names, .. } => {
                for target in table_names {
                    let name = object_name(&target.name);
                    self.table(&name, txn)?;
                    self.delete_rows(&name, txn)?;
                }
            }
            other => return Err(ExecutionError::Unsupported(other.to_string())),
        }
        Ok(ExecutionOutput::Ok)
    }

    fn execute_insert(&self, statement: &Statement, txn: &TxnHandle) -> ExecutionResult<ExecutionOutput> {
        let Statement::Insert(insert) = statement else {
            return Err(ExecutionError::Unsupported(statement.to_string()));
        };
        let table_name = match &insert.table {
            TableObject::TableName(name) => object_name(name),
            _ => return Err(ExecutionError::Unsupported(statement.to_string())),
        };
        let def = self.table(&table_name, txn)?;

        let values = match insert.source.as_ref().map(|q| q.body.as_ref()) {
            Some(SetExpr::Values(values)) => values,
            _ => {
                return Err(ExecutionError::Unsupported(
                    "INSERT 只支持 VALUES 形式".to_string(),
                ))
            }
        };
        let positions = if insert.columns.is_empty() {
            (0..def.columns.len()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|c| def.column_index(&table_name, &c.value))
                .collect::<ExecutionResult<Vec<_>>>()?
        };

        let scope = RowScope::empty();
        let mut inserted = 0;
        for row in &values.rows {
            if row.len() > positions.len() {
                return Err(ExecutionError::TypeError(format!(
                    "INSERT 的值个数 {} 多于表 {} 的目标列数 {}",
                    row.len(),
                    table_name,
                    positions.len()
                )));
            }
            let mut cells = vec![NULL.to_string(); def.columns.len()];
            for (position, expr) in positions.iter().zip(row) {
                cells[*position] = scope.eval(expr)?;
            }

            let pk = primary_key(&cells);
            if pk == NULL {
                return Err(ExecutionError::ConstraintViolation(format!(
                    "表 {} 的主键不能为 NULL",
                    table_name
                )));
            }
            let key = row_key(&table_name, pk);
            if self.store.read(txn, &key)?.is_some() {
                return Err(ExecutionError::ConstraintViolation(format!(
                    "表 {} 的主键值 {} 重复",
                    table_name, pk
                )));
            }
            self.store.write(txn, &key, to_json(&cells)?)?;
            inserted += 1;
        }
        Ok(ExecutionOutput::RowsAffected(inserted))
    }

    fn execute_select(&self, statement: &Statement, txn: &TxnHandle) -> ExecutionResult<ExecutionOutput> {
        let Statement::Query(query) = statement else {
            return Err(ExecutionError::Unsupported(statement.to_string()));
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(ExecutionError::Unsupported(format!("查询形式 {}", query.body)));
        };
        let plain_grouping = matches!(&select.group_by, GroupByExpr::Expressions(exprs, _) if exprs.is_empty());
        if query.with.is_some()
            || query.order_by.is_some()
            || query.limit.is_some()
            || query.offset.is_some()
            || select.distinct.is_some()
            || select.having.is_some()
            || !plain_grouping
        {
            return Err(ExecutionError::Unsupported(format!("查询子句 {}", query)));
        }

        let tables = relations(statement);
        let (columns, rows) = match tables.as_slice() {
            [] => {
                let keep = match &select.selection {
                    Some(predicate) => RowScope::empty().test(predicate)?,
                    None => true,
                };
                let rows = if keep { vec![Vec::new()] } else { Vec::new() };
                (Vec::new(), rows)
            }
            [table] => {
                let def = self.table(table, txn)?;
                let rows = self
                    .matching_rows(table, &def, select.selection.as_ref(), txn)?
                    .into_iter()
                    .map(|(_, row)| row)
                    .collect();
                (def.columns, rows)
            }
            _ => return Err(ExecutionError::Unsupported("多表查询".to_string())),
        };
        project(&select.projection, &columns, &rows)
    }

    fn execute_update(&self, statement: &Statement, txn: &TxnHandle) -> ExecutionResult<ExecutionOutput> {
        let Statement::Update {
            assignments,
            from,
            selection,
            returning,
            ..
        } = statement
        else {
            return Err(ExecutionError::Unsupported(statement.to_string()));
        };
        if from.is_some() || returning.is_some() {
            return Err(ExecutionError::Unsupported(statement.to_string()));
        }
        let table = first_relation(statement)?;
        let def = self.table(&table, txn)?;

        let targets = assignments
            .iter()
            .map(|assignment| match &assignment.target {
                AssignmentTarget::ColumnName(name) => {
                    Ok((def.column_index(&table, &column_name(name))?, &assignment.value))
                }
                AssignmentTarget::Tuple(_) => Err(ExecutionError::Unsupported(format!(
                    "元组赋值 {}",
                    assignment
                ))),
            })
            .collect::<ExecutionResult<Vec<_>>>()?;

        let rows = self.matching_rows(&table, &def, selection.as_ref(), txn)?;
        for (key, row) in &rows {
            // 赋值表达式读取的是更新前的行
            let scope = RowScope::new(&def.columns, row);
            let mut updated = row.clone();
            for (index, value) in &targets {
                updated[*index] = scope.eval(value)?;
            }

            let new_key = row_key(&table, primary_key(&updated));
            if new_key != *key {
                if primary_key(&updated) == NULL || self.store.read(txn, &new_key)?.is_some() {
                    return Err(ExecutionError::ConstraintViolation(format!(
                        "表 {} 的主键值 {} 无效或重复",
                        table,
                        primary_key(&updated)
                    )));
                }
                self.store.delete(txn, key)?;
            }
            self.store.write(txn, &new_key, to_json(&updated)?)?;
        }
        Ok(ExecutionOutput::RowsAffected(rows.len() as u64))
    }

    fn execute_delete(&self, statement: &Statement, txn: &TxnHandle) -> ExecutionResult<ExecutionOutput> {
        let Statement::Delete(delete) = statement else {
            return Err(ExecutionError::Unsupported(statement.to_string()));
        };
        if delete.using.is_some() || delete.returning.is_some() || delete.limit.is_some() {
            return Err(ExecutionError::Unsupported(statement.to_string()));
        }
        let table = first_relation(statement)?;
        let def = self.table(&table, txn)?;

        let rows = self.matching_rows(&table, &def, delete.selection.as_ref(), txn)?;
        for (key, _) in &rows {
            self.store.delete(txn, key)?;
        }
        Ok(ExecutionOutput::RowsAffected(rows.len() as u64))
    }

    fn execute_misc(&self, statement: &Statement, txn: &TxnHandle) -> ExecutionResult<ExecutionOutput> {
        match statement {
            Statement::Explain {
                statement: inner, ..
            } => {
                // 内层语句只做校验，不执行
                for table in relations(inner) {
                    self.table(&table, txn)?;
                }
                Ok(ExecutionOutput::Rows {
                    columns: vec!["plan".to_string()],
                    rows: vec![vec![format!("{}: {}", classify(inner), inner)]],
                })
            }
            Statement::Savepoint { .. } | Statement::Rollback { .. } => {
                Err(ExecutionError::Unsupported("保存点".to_string()))
            }
            _ => Ok(ExecutionOutput::Ok),
        }
    }
}

impl StatementExecutor for MemoryExecutor {
    fn execute(
        &self,
        category: StatementCategory,
        statement: &ParsedStatement,
        txn: &TxnHandle,
    ) -> ExecutionResult<ExecutionOutput> {
        debug!("txn {} executing {}: {}", txn.id, category, statement.sql());
        let stmt = statement.statement();
        match category {
            _ if category.is_transaction_control() => Err(ExecutionError::Unsupported(format!(
                "事务控制语句 {} 不由执行器处理",
                category
            ))),
            StatementCategory::Ddl => self.execute_ddl(stmt, txn),
            StatementCategory::Insert => self.execute_insert(stmt, txn),
            StatementCategory::Select => self.execute_select(stmt, txn),
            StatementCategory::Update => self.execute_update(stmt, txn),
            StatementCategory::Delete => self.execute_delete(stmt, txn),
            _ => self.execute_misc(stmt, txn),
        }
    }
}

/// 计算投影，`*` 展开为全部列
fn project(items: &[SelectItem], columns: &[String], rows: &[Vec<String>]) -> ExecutionResult<ExecutionOutput> {
    let mut header = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                header.extend(columns.iter().cloned())
            }
            SelectItem::UnnamedExpr(expr) => header.push(output_name(expr)),
            SelectItem::ExprWithAlias { alias, .. } => header.push(alias.value.clone()),
        }
    }

    let mut output = Vec::with_capacity(rows.len());
    for row in rows {
        let scope = RowScope::new(columns, row);
        let mut cells = Vec::with_capacity(header.len());
        for item in items {
            match item {
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                    cells.extend(row.iter().cloned())
                }
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    cells.push(scope.eval(expr)?)
                }
            }
        }
        output.push(cells);
    }
    Ok(ExecutionOutput::Rows {
        columns: header,
        rows: output,
    })
}

fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.to_lowercase(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| ident.value.to_lowercase())
            .unwrap_or_else(|| expr.to_string()),
        _ => expr.to_string(),
    }
}

fn object_name(name: &ObjectName) -> String {
    name.to_string().to_lowercase()
}

fn column_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|part| {
            part.as_ident()
                .map(|ident| ident.value.clone())
                .unwrap_or_else(|| part.to_string())
        })
        .unwrap_or_default()
        .to_lowercase()
}

fn primary_key(cells: &[String]) -> &str {
    cells.first().map(String::as_str).unwrap_or(NULL)
}

fn database_key(name: &str) -> String {
    format!("{}{}", DATABASE_PREFIX, name)
}

fn table_key(name: &str) -> String {
    format!("{}{}", TABLE_PREFIX, name)
}

fn row_prefix(table: &str) -> String {
    format!("{}/", table)
}

fn row_key(table: &str, pk: &str) -> String {
    format!("{}/{}", table, pk)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> ExecutionResult<String> {
    serde_json::to_string(value).map_err(|e| ExecutionError::Store(StoreError::Other(e.to_string())))
}

fn from_json<T: DeserializeOwned>(value: &str) -> ExecutionResult<T> {
    serde_json::from_str(value).map_err(|e| ExecutionError::Store(StoreError::Other(e.to_string())))
}

/// 语句引用的全部关系（去重，保持出现顺序）
fn relations(statement: &Statement) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let _ = visit_relations(statement, |relation| {
        let name = object_name(relation);
        if !names.contains(&name) {
            names.push(name);
        }
        ControlFlow::<()>::Continue(())
    });
    names
}

fn first_relation(statement: &Statement) -> ExecutionResult<String> {
    relations(statement)
        .into_iter()
        .next()
        .ok_or_else(|| ExecutionError::Unsupported(format!("语句没有目标表: {}", statement)))
}

/// 主键等值谓词对应的主键值
fn key_filter(selection: Option<&Expr>, def: &TableDef) -> Option<String> {
    let Some(Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    }) = selection
    else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (Expr::Identifier(ident), Expr::Value(_))
            if def.columns.first() == Some(&ident.value.to_lowercase()) =>
        {
            Some(literal_text(right))
        }
        _ => None,
    }
}
