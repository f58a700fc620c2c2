//! 行表达式求值
//!
//! 单元格一律以文本保存，`NULL` 用字面量 `NULL` 表示。
//! 两侧都能解析为数字时按数值运算与比较，否则按文本比较。
//! 只覆盖内存执行器需要的表达式子集，其余表达式返回 `Unsupported`

use std::cmp::Ordering;

use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator};

use crate::core::error::{ExecutionError, ExecutionResult};

pub const NULL: &str = "NULL";

/// 表达式求值时可见的一行
pub struct RowScope<'a> {
    columns: &'a [String],
    cells: &'a [String],
}

impl<'a> RowScope<'a> {
    pub fn new(columns: &'a [String], cells: &'a [String]) -> Self {
        Self { columns, cells }
    }

    /// 没有任何列的作用域，用于不带 FROM 的查询
    pub fn empty() -> Self {
        Self {
            columns: &[],
            cells: &[],
        }
    }

    fn column(&self, name: &str) -> ExecutionResult<String> {
        let name = name.to_lowercase();
        let index = self
            .columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| ExecutionError::ObjectNotFound(format!("列 {} 不存在", name)))?;
        Ok(self
            .cells
            .get(index)
            .cloned()
            .unwrap_or_else(|| NULL.to_string()))
    }

    /// 求值为单元格文本
    pub fn eval(&self, expr: &Expr) -> ExecutionResult<String> {
        match expr {
            Expr::Identifier(ident) => self.column(&ident.value),
            Expr::CompoundIdentifier(idents) => match idents.last() {
                Some(ident) => self.column(&ident.value),
                None => Err(unsupported(expr)),
            },
            Expr::Value(_) => Ok(literal_text(expr)),
            Expr::Nested(inner) => self.eval(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr: inner,
            } => self.eval(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: inner,
            } => arithmetic(&BinaryOperator::Minus, "0", &self.eval(inner)?),
            Expr::BinaryOp { left, op, right } if is_arithmetic(op) => {
                arithmetic(op, &self.eval(left)?, &self.eval(right)?)
            }
            Expr::BinaryOp { .. }
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::UnaryOp {
                op: UnaryOperator::Not,
                ..
            } => Ok(self.test(expr)?.to_string()),
            _ => Err(unsupported(expr)),
        }
    }

    /// 求值为谓词，NULL 参与的比较为假
    pub fn test(&self, expr: &Expr) -> ExecutionResult<bool> {
        match expr {
            Expr::Nested(inner) => self.test(inner),
            Expr::IsNull(inner) => Ok(self.eval(inner)? == NULL),
            Expr::IsNotNull(inner) => Ok(self.eval(inner)? != NULL),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: inner,
            } => Ok(!self.test(inner)?),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(self.test(left)? && self.test(right)?),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => Ok(self.test(left)? || self.test(right)?),
            Expr::BinaryOp { left, op, right } => {
                let (left, right) = (self.eval(left)?, self.eval(right)?);
                if left == NULL || right == NULL {
                    return Ok(false);
                }
                let ordering = compare(&left, &right);
                match op {
                    BinaryOperator::Eq => Ok(ordering == Ordering::Equal),
                    BinaryOperator::NotEq => Ok(ordering != Ordering::Equal),
                    BinaryOperator::Lt => Ok(ordering == Ordering::Less),
                    BinaryOperator::LtEq => Ok(ordering != Ordering::Greater),
                    BinaryOperator::Gt => Ok(ordering == Ordering::Greater),
                    BinaryOperator::GtEq => Ok(ordering != Ordering::Less),
                    _ => Err(unsupported(expr)),
                }
            }
            _ => match self.eval(expr)?.to_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(ExecutionError::TypeError(format!(
                    "{} 不是布尔值: {}",
                    expr, other
                ))),
            },
        }
    }
}

/// 字面量的文本形式，单引号字符串去掉引号
pub fn literal_text(expr: &Expr) -> String {
    let text = expr.to_string();
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        text[1..text.len() - 1].replace("''", "'")
    } else {
        text
    }
}

fn unsupported(expr: &Expr) -> ExecutionError {
    ExecutionError::Unsupported(format!("表达式 {}", expr))
}

fn is_arithmetic(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo
    )
}

fn compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn arithmetic(op: &BinaryOperator, left: &str, right: &str) -> ExecutionResult<String> {
    if left == NULL || right == NULL {
        return Ok(NULL.to_string());
    }
    let overflow = || ExecutionError::TypeError(format!("{} {} {} 溢出或除以零", left, op, right));

    if let (Ok(l), Ok(r)) = (left.parse::<i64>(), right.parse::<i64>()) {
        let value = match op {
            BinaryOperator::Plus => l.checked_add(r),
            BinaryOperator::Minus => l.checked_sub(r),
            BinaryOperator::Multiply => l.checked_mul(r),
            BinaryOperator::Divide => l.checked_div(r),
            BinaryOperator::Modulo => l.checked_rem(r),
            _ => None,
        };
        return value.map(|v| v.to_string()).ok_or_else(overflow);
    }

    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => {
            let value = match op {
                BinaryOperator::Plus => l + r,
                BinaryOperator::Minus => l - r,
                BinaryOperator::Multiply => l * r,
                BinaryOperator::Divide => l / r,
                BinaryOperator::Modulo => l % r,
                _ => f64::NAN,
            };
            if value.is_finite() {
                Ok(value.to_string())
            } else {
                Err(overflow())
            }
        }
        _ => Err(ExecutionError::TypeError(format!(
            "无法对 '{}' 与 '{}' 做算术运算",
            left, right
        ))),
    }
}
