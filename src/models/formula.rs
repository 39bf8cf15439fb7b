//! Settlement formula tokens and request models

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SettlementError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "/" => Some(Operator::Div),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    /// `*` and `/` bind tighter than `+` and `-`
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            // Billing treats x/0 as 0 rather than inf
            Operator::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaToken {
    Number(f64),
    Field(String),
    Operator(Operator),
    GroupOpen,
    GroupClose,
}

/// Token as stored and exchanged with the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFormulaToken {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RawFormulaToken {
    fn value_str(&self) -> String {
        match &self.value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }

    pub fn decode(&self) -> Result<FormulaToken> {
        let value = self.value_str();
        match self.kind.as_str() {
            "number" => parse_number(&value).map(FormulaToken::Number),
            "field" => {
                if value.is_empty() {
                    return Err(SettlementError::computation("field token without a name"));
                }
                Ok(FormulaToken::Field(value))
            }
            "operator" => match value.as_str() {
                "(" => Ok(FormulaToken::GroupOpen),
                ")" => Ok(FormulaToken::GroupClose),
                sym => Operator::from_symbol(sym)
                    .map(FormulaToken::Operator)
                    .ok_or_else(|| {
                        SettlementError::computation(format!("unsupported operator: {}", sym))
                    }),
            },
            other => Err(SettlementError::computation(format!(
                "unknown token type: {}",
                other
            ))),
        }
    }
}

fn parse_number(literal: &str) -> Result<f64> {
    if literal == "pi" {
        return Ok(std::f64::consts::PI);
    }
    literal
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| SettlementError::computation(format!("invalid number literal: {}", literal)))
}

/// Decode the stored JSON token array
pub fn decode_tokens(raw: &Value) -> Result<Vec<FormulaToken>> {
    let tokens: Vec<RawFormulaToken> = serde_json::from_value(raw.clone())
        .map_err(|e| SettlementError::computation(format!("invalid formula tokens: {}", e)))?;
    tokens.iter().map(RawFormulaToken::decode).collect()
}

/// Create/update payload for a formula
#[derive(Debug, Clone, Deserialize)]
pub struct FormulaInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub tokens: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub updated_by: Option<String>,
}

fn default_enabled() -> bool {
    true
}
