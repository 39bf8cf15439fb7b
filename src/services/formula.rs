//! Formula evaluation and formula management.
//!
//! Formulas are stored as token arrays. Evaluation converts them to RPN with
//! a shunting-yard pass and reduces the RPN with an operand stack. Fields the
//! environment cannot resolve evaluate as 0.0 and are reported back, so a
//! result is still produced when rate data is incomplete.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::info;

use crate::entities::settlement_formulas;
use crate::error::{Result, SettlementError};
use crate::models::formula::{decode_tokens, FormulaInput, FormulaToken};
use crate::store::FormulaStore;

/// Value of an evaluated formula plus the fields that had to default to 0.0
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    pub missing_fields: BTreeSet<String>,
}

/// Shunting-yard conversion to postfix order
pub fn to_rpn(tokens: &[FormulaToken]) -> Result<Vec<FormulaToken>> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<FormulaToken> = Vec::new();

    for token in tokens {
        match token {
            FormulaToken::Number(_) | FormulaToken::Field(_) => output.push(token.clone()),
            FormulaToken::Operator(op) => {
                // Equal precedence pops too, giving left associativity
                while let Some(FormulaToken::Operator(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    if let Some(popped) = stack.pop() {
                        output.push(popped);
                    }
                }
                stack.push(token.clone());
            }
            FormulaToken::GroupOpen => stack.push(FormulaToken::GroupOpen),
            FormulaToken::GroupClose => loop {
                match stack.pop() {
                    Some(FormulaToken::GroupOpen) => break,
                    Some(other) => output.push(other),
                    None => {
                        return Err(SettlementError::computation("unmatched closing parenthesis"))
                    }
                }
            },
        }
    }

    while let Some(token) = stack.pop() {
        if token == FormulaToken::GroupOpen {
            return Err(SettlementError::computation("unmatched opening parenthesis"));
        }
        output.push(token);
    }

    Ok(output)
}

/// Reduce an RPN sequence against `env`
pub fn evaluate_rpn(rpn: &[FormulaToken], env: &HashMap<String, f64>) -> Result<Evaluation> {
    let mut stack: Vec<f64> = Vec::with_capacity(rpn.len());
    let mut missing_fields = BTreeSet::new();

    for token in rpn {
        match token {
            FormulaToken::Number(n) => stack.push(*n),
            FormulaToken::Field(name) => match env.get(name) {
                Some(v) => stack.push(*v),
                None => {
                    missing_fields.insert(name.clone());
                    stack.push(0.0);
                }
            },
            FormulaToken::Operator(op) => {
                let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                    return Err(SettlementError::computation(format!(
                        "operator {} is missing an operand",
                        op.symbol()
                    )));
                };
                stack.push(op.apply(a, b));
            }
            FormulaToken::GroupOpen | FormulaToken::GroupClose => {
                return Err(SettlementError::computation("parenthesis left in RPN"));
            }
        }
    }

    match stack.as_slice() {
        [value] => Ok(Evaluation {
            value: *value,
            missing_fields,
        }),
        _ => Err(SettlementError::computation("operand/operator mismatch")),
    }
}

pub fn evaluate(tokens: &[FormulaToken], env: &HashMap<String, f64>) -> Result<Evaluation> {
    evaluate_rpn(&to_rpn(tokens)?, env)
}

/// Tokens that decode, convert to RPN and reduce to a single value
pub fn validate_tokens(raw: &serde_json::Value) -> Result<Vec<FormulaToken>> {
    let check = || -> Result<Vec<FormulaToken>> {
        let tokens = decode_tokens(raw)?;
        if tokens.is_empty() {
            return Err(SettlementError::computation("formula has no tokens"));
        }
        // An empty environment only produces missing fields, never errors
        evaluate(&tokens, &HashMap::new())?;
        Ok(tokens)
    };
    check().map_err(|e| match e {
        SettlementError::Computation(msg) => {
            SettlementError::validation(format!("invalid formula: {}", msg))
        }
        other => other,
    })
}

#[derive(Clone)]
pub struct FormulaService {
    store: Arc<dyn FormulaStore>,
}

impl FormulaService {
    pub fn new(store: Arc<dyn FormulaStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<settlement_formulas::Model>> {
        self.store.list_formulas().await
    }

    pub async fn get(&self, id: i64) -> Result<settlement_formulas::Model> {
        self.store
            .formula(id)
            .await?
            .ok_or_else(|| SettlementError::not_found(format!("formula {}", id)))
    }

    pub async fn create(&self, input: FormulaInput) -> Result<settlement_formulas::Model> {
        let input = Self::validate(input)?;
        let formula = self.store.create_formula(input).await?;
        info!(formula_id = formula.id, name = %formula.name, "Created settlement formula");
        Ok(formula)
    }

    pub async fn update(&self, id: i64, input: FormulaInput) -> Result<settlement_formulas::Model> {
        let input = Self::validate(input)?;
        let formula = self
            .store
            .update_formula(id, input)
            .await?
            .ok_or_else(|| SettlementError::not_found(format!("formula {}", id)))?;
        info!(formula_id = id, "Updated settlement formula");
        Ok(formula)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.store.delete_formula(id).await? {
            return Err(SettlementError::not_found(format!("formula {}", id)));
        }
        info!(formula_id = id, "Deleted settlement formula");
        Ok(())
    }

    /// Explicit id, or the default formula when none is given
    pub async fn resolve(&self, formula_id: Option<i64>) -> Result<settlement_formulas::Model> {
        match formula_id.filter(|id| *id > 0) {
            Some(id) => self
                .store
                .formula(id)
                .await?
                .ok_or_else(|| SettlementError::validation(format!("formula {} does not exist", id))),
            None => self
                .store
                .default_formula()
                .await?
                .ok_or_else(|| SettlementError::not_found("no enabled settlement formula")),
        }
    }

    fn validate(mut input: FormulaInput) -> Result<FormulaInput> {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(SettlementError::validation("formula name is required"));
        }
        validate_tokens(&input.tokens)?;
        Ok(input)
    }
}
