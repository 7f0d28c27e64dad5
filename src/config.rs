use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{LoanError, Result};

/// loan product configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanConfig {
    /// installment counts a loan may be split into
    pub installments_allowed: Vec<u32>,
    /// inclusive lower bound for the interest rate
    pub interest_min: Rate,
    /// inclusive upper bound for the interest rate
    pub interest_max: Rate,
    /// day of month the payment window closes on (1-30)
    pub day_of_payment: u32,
    /// how many months ahead installments may be paid (0-12)
    pub max_allowed_due_month_count: u32,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            installments_allowed: vec![6, 9, 12, 24],
            interest_min: Rate::from_decimal(dec!(0.1)),
            interest_max: Rate::from_decimal(dec!(0.5)),
            day_of_payment: 1,
            max_allowed_due_month_count: 3,
        }
    }
}

impl LoanConfig {
    /// parse from json; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LoanConfig =
            serde_json::from_str(json).map_err(|e| LoanError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.installments_allowed.is_empty() {
            return Err(invalid("installments_allowed must not be empty"));
        }
        if self.installments_allowed.contains(&0) {
            return Err(invalid("installments_allowed must only contain positive counts"));
        }
        if self.interest_min < Rate::ZERO {
            return Err(invalid("interest_min must not be negative"));
        }
        if self.interest_max > Rate::ONE {
            return Err(invalid("interest_max must not exceed 1.0"));
        }
        if self.interest_min > self.interest_max {
            return Err(invalid(format!(
                "interest_min {} is above interest_max {}",
                self.interest_min, self.interest_max
            )));
        }
        if !(1..=30).contains(&self.day_of_payment) {
            return Err(invalid(format!(
                "day_of_payment must be within 1..=30, got {}",
                self.day_of_payment
            )));
        }
        if self.max_allowed_due_month_count > 12 {
            return Err(invalid(format!(
                "max_allowed_due_month_count must be within 0..=12, got {}",
                self.max_allowed_due_month_count
            )));
        }
        Ok(())
    }

    pub fn is_installment_allowed(&self, installments: u32) -> bool {
        self.installments_allowed.contains(&installments)
    }

    pub fn is_rate_allowed(&self, rate: Rate) -> bool {
        rate >= self.interest_min && rate <= self.interest_max
    }
}

fn invalid(message: impl Into<String>) -> LoanError {
    LoanError::InvalidConfiguration {
        message: message.into(),
    }
}
