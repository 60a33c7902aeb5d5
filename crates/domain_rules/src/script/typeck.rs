//! Static type checking
//!
//! Runs once per compile so that a script that would write a string into an
//! amount, or test a number for truth, never reaches a knowledge base.

use domain_claims::FieldType;

use super::ast::{BinaryOp, Builtin, Expr, Node, NodeId, Statement, UnaryOp};
use super::error::ScriptError;

pub struct TypeChecker<'a> {
    source: &'a str,
    nodes: &'a [Node],
}

impl<'a> TypeChecker<'a> {
    pub fn new(source: &'a str, nodes: &'a [Node]) -> Self {
        Self { source, nodes }
    }

    pub fn check(&self, condition: NodeId, actions: &[Statement]) -> Result<(), ScriptError> {
        let cond_ty = self.type_of(condition)?;
        if cond_ty != FieldType::Bool {
            return Err(self.error(condition, format!("condition must be boolean, found {}", cond_ty)));
        }

        for action in actions {
            if let Statement::Assign { field, value, .. } = action {
                if !field.is_writable() {
                    return Err(ScriptError::ReadOnlyField {
                        field: field.name().to_string(),
                    });
                }
                let value_ty = self.type_of(*value)?;
                if !field.field_type().accepts(value_ty) {
                    return Err(self.error(
                        *value,
                        format!(
                            "cannot assign {} to Claim.{} ({})",
                            value_ty,
                            field.name(),
                            field.field_type()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn type_of(&self, id: NodeId) -> Result<FieldType, ScriptError> {
        let node = self
            .nodes
            .get(id.index())
            .ok_or_else(|| ScriptError::syntax(self.source, 0, "dangling expression reference"))?;

        match &node.expr {
            Expr::Int(_) => Ok(FieldType::Int),
            Expr::Decimal(_) => Ok(FieldType::Decimal),
            Expr::Bool(_) => Ok(FieldType::Bool),
            Expr::Str(_) => Ok(FieldType::Text),
            Expr::List(items) => {
                for item in items {
                    let ty = self.type_of(*item)?;
                    if ty != FieldType::Text {
                        return Err(self.error(*item, format!("list items must be strings, found {}", ty)));
                    }
                }
                Ok(FieldType::TextList)
            }
            Expr::Field(field) => Ok(field.field_type()),
            Expr::Unary { op, operand } => {
                let ty = self.type_of(*operand)?;
                match op {
                    UnaryOp::Not if ty == FieldType::Bool => Ok(FieldType::Bool),
                    UnaryOp::Neg if ty.is_numeric() => Ok(ty),
                    UnaryOp::Not => Err(self.error(id, format!("'!' needs a boolean, found {}", ty))),
                    UnaryOp::Neg => Err(self.error(id, format!("'-' needs a number, found {}", ty))),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.type_of(*lhs)?;
                let r = self.type_of(*rhs)?;
                self.binary_type(id, *op, l, r)
            }
            Expr::Call { func, args } => {
                let types = args
                    .iter()
                    .map(|a| self.type_of(*a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_type(id, *func, &types)
            }
        }
    }

    fn binary_type(
        &self,
        id: NodeId,
        op: BinaryOp,
        l: FieldType,
        r: FieldType,
    ) -> Result<FieldType, ScriptError> {
        use BinaryOp::*;
        let mismatch = || {
            self.error(
                id,
                format!("operator '{}' cannot combine {} and {}", op.symbol(), l, r),
            )
        };

        match op {
            Or | And => {
                if l == FieldType::Bool && r == FieldType::Bool {
                    Ok(FieldType::Bool)
                } else {
                    Err(mismatch())
                }
            }
            Eq | Ne => {
                if (l.is_numeric() && r.is_numeric()) || l == r {
                    Ok(FieldType::Bool)
                } else {
                    Err(mismatch())
                }
            }
            Lt | Le | Gt | Ge => {
                if l.is_numeric() && r.is_numeric() {
                    Ok(FieldType::Bool)
                } else {
                    Err(mismatch())
                }
            }
            Add if l == FieldType::Text && r == FieldType::Text => Ok(FieldType::Text),
            Add | Sub | Mul | Div | Rem => {
                if l == FieldType::Int && r == FieldType::Int {
                    Ok(FieldType::Int)
                } else if l.is_numeric() && r.is_numeric() {
                    Ok(FieldType::Decimal)
                } else {
                    Err(mismatch())
                }
            }
        }
    }

    fn call_type(
        &self,
        id: NodeId,
        func: Builtin,
        args: &[FieldType],
    ) -> Result<FieldType, ScriptError> {
        let bad_args = || {
            let rendered = args.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
            self.error(id, format!("{} cannot be called with ({})", func.name(), rendered))
        };
        let all_numeric = args.iter().all(FieldType::is_numeric);
        let all_int = args.iter().all(|t| *t == FieldType::Int);

        match func {
            Builtin::Append => match args {
                [FieldType::TextList, FieldType::Text] => Ok(FieldType::TextList),
                _ => Err(bad_args()),
            },
            Builtin::Contains => match args {
                [FieldType::TextList, FieldType::Text] => Ok(FieldType::Bool),
                _ => Err(bad_args()),
            },
            Builtin::Len => match args {
                [FieldType::TextList] | [FieldType::Text] => Ok(FieldType::Int),
                _ => Err(bad_args()),
            },
            Builtin::Min | Builtin::Max | Builtin::Clamp if all_numeric => {
                Ok(if all_int { FieldType::Int } else { FieldType::Decimal })
            }
            Builtin::Floor | Builtin::Percent if all_numeric => Ok(FieldType::Int),
            _ => Err(bad_args()),
        }
    }

    fn error(&self, id: NodeId, message: String) -> ScriptError {
        let offset = self.nodes.get(id.index()).map_or(0, |n| n.span.start);
        ScriptError::type_error(self.source, offset, message)
    }
}
