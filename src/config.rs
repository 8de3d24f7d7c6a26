//! Environment-driven service configuration.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::value_objects::TaxRate;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub currency: String,
    pub tax_rate: TaxRate,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT must be a number")?;
        let nats_url = std::env::var("NATS_URL").ok();
        let currency = std::env::var("CURRENCY").unwrap_or_else(|_| "NGN".to_string());
        let tax_percent = match std::env::var("TAX_RATE_PERCENT") {
            Ok(raw) => Decimal::from_str(&raw).context("TAX_RATE_PERCENT must be a decimal")?,
            Err(_) => Decimal::new(500, 2), // 5.00%
        };
        Ok(Self {
            database_url,
            port,
            nats_url,
            currency,
            tax_rate: TaxRate::percent(tax_percent),
        })
    }
}
