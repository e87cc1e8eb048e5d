//! Term evaluation for the reference executor.

use crate::backend::target::term::{BinOp, Term};

use super::types::{Value, VmError, VmResult};
use super::TargetVm;

/// Element bound while evaluating an array combinator's operand
#[derive(Clone, Copy)]
struct Element<'a> {
    value: &'a Value,
    index: usize,
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Value {
    let (x, y) = (a.as_number(), b.as_number());
    match op {
        BinOp::Add => Value::Number(x + y),
        BinOp::Sub => Value::Number(x - y),
        BinOp::Mul => Value::Number(x * y),
        // The engine yields 0 instead of faulting
        BinOp::Div if y == 0.0 => Value::Number(0.0),
        BinOp::Div => Value::Number(x / y),
        BinOp::Mod if y == 0.0 => Value::Number(0.0),
        BinOp::Mod => Value::Number(x % y),
        BinOp::Pow => Value::Number(x.powf(y)),
        BinOp::Min => Value::Number(x.min(y)),
        BinOp::Max => Value::Number(x.max(y)),
        BinOp::Eq => Value::Bool(a.loose_eq(b)),
        BinOp::Ne => Value::Bool(!a.loose_eq(b)),
        BinOp::Lt => Value::Bool(x < y),
        BinOp::Le => Value::Bool(x <= y),
        BinOp::Gt => Value::Bool(x > y),
        BinOp::Ge => Value::Bool(x >= y),
        BinOp::And => Value::Bool(a.is_truthy() && b.is_truthy()),
        BinOp::Or => Value::Bool(a.is_truthy() || b.is_truthy()),
        BinOp::BitAnd => Value::Number(((x as i64) & (y as i64)) as f64),
    }
}

fn distance(a: &Value, b: &Value) -> f64 {
    let (a, b) = (a.as_array(), b.as_array());
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).map_or(0.0, Value::as_number);
            let y = b.get(i).map_or(0.0, Value::as_number);
            (x - y) * (x - y)
        })
        .sum::<f64>()
        .sqrt()
}

impl TargetVm {
    /// Evaluate a term against current storage
    pub fn eval(&self, term: &Term) -> VmResult<Value> {
        self.eval_in(term, None)
    }

    fn eval_in(&self, term: &Term, element: Option<Element<'_>>) -> VmResult<Value> {
        Ok(match term {
            Term::Null => Value::Null,
            Term::Number(n) => Value::Number(*n),
            Term::Bool(b) => Value::Bool(*b),
            Term::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|t| self.eval_in(t, element))
                    .collect::<VmResult<_>>()?,
            ),
            Term::Var(slot) => self.value(*slot),
            Term::Index(array, index) => {
                let array = self.eval_in(array, element)?;
                let index = self.eval_in(index, element)?;
                index
                    .as_index()
                    .and_then(|i| array.as_array().get(i).cloned())
                    .unwrap_or_default()
            }
            Term::First(array) => self
                .eval_in(array, element)?
                .as_array()
                .first()
                .cloned()
                .unwrap_or_default(),
            Term::Last(array) => self
                .eval_in(array, element)?
                .as_array()
                .last()
                .cloned()
                .unwrap_or_default(),
            Term::CountOf(array) => {
                Value::Number(self.eval_in(array, element)?.as_array().len() as f64)
            }
            Term::Contains(array, value) => {
                let array = self.eval_in(array, element)?;
                let value = self.eval_in(value, element)?;
                Value::Bool(array.as_array().iter().any(|v| v.loose_eq(&value)))
            }
            Term::IndexOf(array, value) => {
                let array = self.eval_in(array, element)?;
                let value = self.eval_in(value, element)?;
                let position = array.as_array().iter().position(|v| v.loose_eq(&value));
                Value::Number(position.map_or(-1.0, |p| p as f64))
            }
            Term::Binary(op, left, right) => {
                let left = self.eval_in(left, element)?;
                let right = self.eval_in(right, element)?;
                binary(*op, &left, &right)
            }
            Term::Not(operand) => Value::Bool(!self.eval_in(operand, element)?.is_truthy()),
            Term::IfThenElse(condition, then, otherwise) => {
                if self.eval_in(condition, element)?.is_truthy() {
                    self.eval_in(then, element)?
                } else {
                    self.eval_in(otherwise, element)?
                }
            }
            Term::Distance(a, b) => {
                let a = self.eval_in(a, element)?;
                let b = self.eval_in(b, element)?;
                Value::Number(distance(&a, &b))
            }
            Term::ArrayElement => element.ok_or(VmError::NoArrayElement)?.value.clone(),
            Term::ArrayIndex => Value::Number(element.ok_or(VmError::NoArrayElement)?.index as f64),
            Term::Filtered(array, predicate) => {
                let array = self.eval_in(array, element)?;
                let mut kept = Vec::new();
                for (index, value) in array.as_array().iter().enumerate() {
                    if self.eval_in(predicate, Some(Element { value, index }))?.is_truthy() {
                        kept.push(value.clone());
                    }
                }
                Value::Array(kept)
            }
            Term::Mapped(array, mapping) => {
                let array = self.eval_in(array, element)?;
                let mapped = array
                    .as_array()
                    .iter()
                    .enumerate()
                    .map(|(index, value)| self.eval_in(mapping, Some(Element { value, index })))
                    .collect::<VmResult<_>>()?;
                Value::Array(mapped)
            }
            Term::Sorted(array, key) => {
                let array = self.eval_in(array, element)?;
                let mut keyed = array
                    .as_array()
                    .iter()
                    .enumerate()
                    .map(|(index, value)| {
                        let key = self.eval_in(key, Some(Element { value, index }))?;
                        Ok((key.as_number(), value.clone()))
                    })
                    .collect::<VmResult<Vec<_>>>()?;
                keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
                Value::Array(keyed.into_iter().map(|(_, v)| v).collect())
            }
            Term::IsTrueForAny(array, predicate) => {
                let array = self.eval_in(array, element)?;
                let mut any = false;
                for (index, value) in array.as_array().iter().enumerate() {
                    if self.eval_in(predicate, Some(Element { value, index }))?.is_truthy() {
                        any = true;
                        break;
                    }
                }
                Value::Bool(any)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::target::vars::{Slot, VarScope};
    use crate::backend::target::vm::VmConfig;

    #[test]
    fn test_combinators() {
        let mut vm = TargetVm::new(VmConfig::default());
        let slot = Slot::new(VarScope::Global, 0);
        vm.set(slot, Value::numbers(&[5.0, 2.0, 9.0, 2.0]));

        let sorted = Term::Var(slot).sorted(Term::ArrayElement);
        assert_eq!(vm.eval(&sorted).unwrap(), Value::numbers(&[2.0, 2.0, 5.0, 9.0]));

        let over_two = Term::Var(slot).filtered(Term::binary(
            BinOp::Gt,
            Term::ArrayElement,
            Term::number(2),
        ));
        assert_eq!(vm.eval(&over_two).unwrap(), Value::numbers(&[5.0, 9.0]));

        let indices = Term::Var(slot).mapped(Term::ArrayIndex);
        assert_eq!(vm.eval(&indices).unwrap(), Value::numbers(&[0.0, 1.0, 2.0, 3.0]));

        assert_eq!(vm.eval(&Term::Var(slot).last()).unwrap(), Value::Number(2.0));
        assert_eq!(
            vm.eval(&Term::Var(slot).index(Term::number(-1))).unwrap(),
            Value::Null
        );
        assert_eq!(vm.eval(&Term::ArrayElement), Err(VmError::NoArrayElement));
    }

    #[test]
    fn test_arithmetic_edge_cases() {
        let vm = TargetVm::new(VmConfig::default());
        let div = Term::binary(BinOp::Div, Term::number(1), Term::number(0));
        assert_eq!(vm.eval(&div).unwrap(), Value::Number(0.0));
        let bits = Term::binary(BinOp::BitAnd, Term::number(6), Term::number(3));
        assert_eq!(vm.eval(&bits).unwrap(), Value::Number(2.0));
        let dist = Term::distance(
            Term::Array(vec![Term::number(0), Term::number(0)]),
            Term::Array(vec![Term::number(3), Term::number(4)]),
        );
        assert_eq!(vm.eval(&dist).unwrap(), Value::Number(5.0));
        let eq = Term::binary(BinOp::Eq, Term::Null, Term::number(0));
        assert_eq!(vm.eval(&eq).unwrap(), Value::Bool(true));
    }
}
