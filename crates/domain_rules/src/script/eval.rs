//! Tree-walking interpreter over a claim context

use rust_decimal::Decimal;

use core_kernel::{Amount, Percent};
use domain_claims::{ClaimContext, FieldValue, WritePolicy};

use super::ast::{BinaryOp, Builtin, Expr, Node, NodeId, UnaryOp};
use super::error::RuntimeError;

pub(crate) struct Interpreter<'a> {
    pub source: &'a str,
    pub nodes: &'a [Node],
}

impl<'a> Interpreter<'a> {
    pub fn eval(&self, id: NodeId, ctx: &ClaimContext) -> Result<FieldValue, RuntimeError> {
        let node = self.node(id)?;
        match &node.expr {
            Expr::Int(v) => Ok(FieldValue::Int(*v)),
            Expr::Decimal(v) => Ok(FieldValue::Decimal(*v)),
            Expr::Bool(v) => Ok(FieldValue::Bool(*v)),
            Expr::Str(v) => Ok(FieldValue::Text(v.clone())),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.eval(*item, ctx)? {
                        FieldValue::Text(s) => out.push(s),
                        _ => return Err(self.type_mismatch(*item)),
                    }
                }
                Ok(FieldValue::TextList(out))
            }
            Expr::Field(field) => Ok(ctx.get(*field)),
            Expr::Unary { op, operand } => {
                let value = self.eval(*operand, ctx)?;
                match (op, value) {
                    (UnaryOp::Not, FieldValue::Bool(b)) => Ok(FieldValue::Bool(!b)),
                    (UnaryOp::Neg, FieldValue::Int(v)) => v
                        .checked_neg()
                        .map(FieldValue::Int)
                        .ok_or_else(|| self.overflow(id)),
                    (UnaryOp::Neg, FieldValue::Decimal(v)) => Ok(FieldValue::Decimal(-v)),
                    _ => Err(self.type_mismatch(id)),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(id, *op, *lhs, *rhs, ctx),
            Expr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(*a, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(id, *func, values)
            }
        }
    }

    pub fn eval_bool(&self, id: NodeId, ctx: &ClaimContext) -> Result<bool, RuntimeError> {
        match self.eval(id, ctx)? {
            FieldValue::Bool(b) => Ok(b),
            _ => Err(self.type_mismatch(id)),
        }
    }

    fn binary(
        &self,
        id: NodeId,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        ctx: &ClaimContext,
    ) -> Result<FieldValue, RuntimeError> {
        match op {
            BinaryOp::And => {
                return Ok(FieldValue::Bool(self.eval_bool(lhs, ctx)? && self.eval_bool(rhs, ctx)?));
            }
            BinaryOp::Or => {
                return Ok(FieldValue::Bool(self.eval_bool(lhs, ctx)? || self.eval_bool(rhs, ctx)?));
            }
            _ => {}
        }

        let l = self.eval(lhs, ctx)?;
        let r = self.eval(rhs, ctx)?;

        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = match (l.as_decimal(), r.as_decimal()) {
                    (Some(a), Some(b)) => a == b,
                    _ => l == r,
                };
                Ok(FieldValue::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (a, b) = match (l.as_decimal(), r.as_decimal()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(self.type_mismatch(id)),
                };
                let result = match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                };
                Ok(FieldValue::Bool(result))
            }
            _ => self.arithmetic(id, op, l, r),
        }
    }

    fn arithmetic(
        &self,
        id: NodeId,
        op: BinaryOp,
        l: FieldValue,
        r: FieldValue,
    ) -> Result<FieldValue, RuntimeError> {
        match (l, r) {
            (FieldValue::Text(a), FieldValue::Text(b)) if op == BinaryOp::Add => {
                Ok(FieldValue::Text(a + &b))
            }
            (FieldValue::Int(a), FieldValue::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => {
                        if b == 0 {
                            return Err(self.division_by_zero(id));
                        }
                        floor_div(a, b)
                    }
                    BinaryOp::Rem => {
                        if b == 0 {
                            return Err(self.division_by_zero(id));
                        }
                        floor_rem(a, b)
                    }
                    _ => return Err(self.type_mismatch(id)),
                };
                result.map(FieldValue::Int).ok_or_else(|| self.overflow(id))
            }
            (l, r) => {
                let (a, b) = match (l.as_decimal(), r.as_decimal()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(self.type_mismatch(id)),
                };
                if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b.is_zero() {
                    return Err(self.division_by_zero(id));
                }
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    BinaryOp::Rem => a.checked_rem(b),
                    _ => return Err(self.type_mismatch(id)),
                };
                result.map(FieldValue::Decimal).ok_or_else(|| self.overflow(id))
            }
        }
    }

    fn call(
        &self,
        id: NodeId,
        func: Builtin,
        args: Vec<FieldValue>,
    ) -> Result<FieldValue, RuntimeError> {
        match (func, args.as_slice()) {
            (Builtin::Append, [FieldValue::TextList(list), FieldValue::Text(item)]) => {
                let mut out = list.clone();
                out.push(item.clone());
                Ok(FieldValue::TextList(out))
            }
            (Builtin::Contains, [FieldValue::TextList(list), FieldValue::Text(item)]) => {
                Ok(FieldValue::Bool(list.iter().any(|s| s == item)))
            }
            (Builtin::Len, [FieldValue::TextList(list)]) => Ok(FieldValue::Int(list.len() as i64)),
            (Builtin::Len, [FieldValue::Text(text)]) => {
                Ok(FieldValue::Int(text.chars().count() as i64))
            }
            (Builtin::Min, [a, b]) | (Builtin::Max, [a, b]) => {
                let pick_left = match (a.as_decimal(), b.as_decimal()) {
                    (Some(x), Some(y)) if func == Builtin::Min => x <= y,
                    (Some(x), Some(y)) => x >= y,
                    _ => return Err(self.type_mismatch(id)),
                };
                let chosen = if pick_left { a } else { b };
                Ok(widen(chosen, a, b))
            }
            (Builtin::Clamp, [x, lo, hi]) => {
                let (xv, lov, hiv) = match (x.as_decimal(), lo.as_decimal(), hi.as_decimal()) {
                    (Some(x), Some(l), Some(h)) => (x, l, h),
                    _ => return Err(self.type_mismatch(id)),
                };
                if lov > hiv {
                    return Err(RuntimeError::InvalidArgument {
                        function: func.name().to_string(),
                        message: format!("lower bound {} exceeds upper bound {}", lov, hiv),
                    });
                }
                let chosen = if xv < lov {
                    lo
                } else if xv > hiv {
                    hi
                } else {
                    x
                };
                let all_int = [x, lo, hi].iter().all(|v| matches!(v, FieldValue::Int(_)));
                Ok(if all_int {
                    chosen.clone()
                } else {
                    FieldValue::Decimal(chosen.as_decimal().unwrap_or(Decimal::ZERO))
                })
            }
            (Builtin::Floor, [x]) => {
                let value = x.as_decimal().ok_or_else(|| self.type_mismatch(id))?;
                let floored = Amount::from_decimal_floor(value).map_err(|_| self.overflow(id))?;
                Ok(FieldValue::Int(floored.minor_units()))
            }
            (Builtin::Percent, [base, pct]) => {
                let (base, pct) = self.percent_inputs(id, base, pct)?;
                let share = pct.apply_bounded(base, Amount::zero(), Amount::new(i64::MAX))?;
                Ok(FieldValue::Int(share.minor_units()))
            }
            (Builtin::Percent, [base, pct, min, max]) => {
                let (base, pct) = self.percent_inputs(id, base, pct)?;
                let min = self.amount_arg(id, min)?;
                let max = self.amount_arg(id, max)?;
                let share = pct.apply_bounded(base, min, max)?;
                Ok(FieldValue::Int(share.minor_units()))
            }
            _ => Err(self.type_mismatch(id)),
        }
    }

    fn percent_inputs(
        &self,
        id: NodeId,
        base: &FieldValue,
        pct: &FieldValue,
    ) -> Result<(Amount, Percent), RuntimeError> {
        let base = self.amount_arg(id, base)?;
        let pct = pct.as_decimal().ok_or_else(|| self.type_mismatch(id))?;
        Ok((base, Percent::new(pct)))
    }

    fn amount_arg(&self, id: NodeId, value: &FieldValue) -> Result<Amount, RuntimeError> {
        let raw = value.as_decimal().ok_or_else(|| self.type_mismatch(id))?;
        Amount::from_decimal_floor(raw).map_err(|_| self.overflow(id))
    }

    fn node(&self, id: NodeId) -> Result<&'a Node, RuntimeError> {
        self.nodes.get(id.index()).ok_or_else(|| RuntimeError::TypeMismatch {
            expression: "<missing node>".to_string(),
        })
    }

    fn snippet(&self, id: NodeId) -> String {
        self.nodes
            .get(id.index())
            .map(|n| n.span.slice(self.source).to_string())
            .unwrap_or_default()
    }

    fn overflow(&self, id: NodeId) -> RuntimeError {
        RuntimeError::Overflow { expression: self.snippet(id) }
    }

    fn division_by_zero(&self, id: NodeId) -> RuntimeError {
        RuntimeError::DivisionByZero { expression: self.snippet(id) }
    }

    fn type_mismatch(&self, id: NodeId) -> RuntimeError {
        RuntimeError::TypeMismatch { expression: self.snippet(id) }
    }
}

/// Keeps integer results integral unless either side was a decimal
fn widen(chosen: &FieldValue, a: &FieldValue, b: &FieldValue) -> FieldValue {
    match (a, b) {
        (FieldValue::Int(_), FieldValue::Int(_)) => chosen.clone(),
        _ => FieldValue::Decimal(chosen.as_decimal().unwrap_or(Decimal::ZERO)),
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

/// Applies a value to a context field, honouring the write policy
pub(crate) fn write(
    ctx: &mut ClaimContext,
    field: domain_claims::ContextField,
    value: FieldValue,
    policy: &WritePolicy,
) -> Result<(), RuntimeError> {
    ctx.set(field, value, policy).map_err(RuntimeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_division_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(i64::MIN, -1), None);
        assert_eq!(floor_rem(-7, 2), Some(1));
    }
}
