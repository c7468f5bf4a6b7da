//! Currency converter over a dated exchange-rate table.

use crate::collaborators::{with_timeout, RateProvider};
use chrono::NaiveDate;
use dashmap::DashMap;
use engine_core::error::AppError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Converts amounts between currencies using the closest rate dated on or
/// before the requested date. Rates are recorded once per pair and date and
/// never overwritten; fresh fetches add new dated rows.
#[derive(Default)]
pub struct CurrencyConverter {
    rates: DashMap<(String, String), BTreeMap<NaiveDate, Decimal>>,
}

impl CurrencyConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rate for a pair and date. Re-recording the identical rate is
    /// a no-op; a conflicting rate for the same pair and date is rejected.
    pub fn record_rate(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
        rate: Decimal,
    ) -> Result<(), AppError> {
        let from = validate_code(from)?;
        let to = validate_code(to)?;
        if rate <= Decimal::ZERO {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "exchange rate must be positive"
            )));
        }

        let mut table = self.rates.entry((from.clone(), to.clone())).or_default();
        if let Some(existing) = table.get(&date).copied() {
            if existing != rate {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "rate for {}->{} on {} already recorded as {}",
                    from,
                    to,
                    date,
                    existing
                )));
            }
            return Ok(());
        }
        table.insert(date, rate);
        Ok(())
    }

    /// Resolve the rate for a pair, preferring the direct pair and falling
    /// back to the inverse of the reverse pair.
    pub fn rate(&self, from: &str, to: &str, as_of: NaiveDate) -> Result<Decimal, AppError> {
        let from = validate_code(from)?;
        let to = validate_code(to)?;
        if from == to {
            return Ok(Decimal::ONE);
        }

        if let Some(rate) = self.latest_on_or_before(&from, &to, as_of) {
            return Ok(rate);
        }
        if let Some(reverse) = self.latest_on_or_before(&to, &from, as_of) {
            if reverse > Decimal::ZERO {
                return Ok(Decimal::ONE / reverse);
            }
        }
        Err(AppError::RateUnavailable {
            from,
            to,
            date: as_of,
        })
    }

    /// Convert an amount between currencies. Identity when the currencies
    /// are equal; the result is intentionally unrounded so callers round
    /// only the final persisted figures.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        as_of: NaiveDate,
    ) -> Result<Decimal, AppError> {
        let from = validate_code(from)?;
        let to = validate_code(to)?;
        if from == to {
            return Ok(amount);
        }
        let rate = self.rate(&from, &to, as_of)?;
        Ok(amount * rate)
    }

    /// Pull rates for the given pairs from the external provider under the
    /// timeout. A provider failure is fatal to the computation that needed
    /// the rate; there is no silent 1:1 fallback.
    #[instrument(skip(self, provider, pairs), fields(pairs = pairs.len()))]
    pub async fn refresh_from_provider(
        &self,
        provider: &dyn RateProvider,
        pairs: &[(String, String)],
        date: NaiveDate,
        timeout: Duration,
    ) -> Result<usize, AppError> {
        let mut recorded = 0;
        for (from, to) in pairs {
            let rate = with_timeout(timeout, "rate_provider", provider.fetch_rate(from, to, date))
                .await?;
            match self.record_rate(from, to, date, rate) {
                Ok(()) => recorded += 1,
                // An already-recorded identical rate is fine; a conflicting
                // one means the provider changed history, which we refuse.
                Err(AppError::Conflict(e)) => {
                    warn!(from = %from, to = %to, %date, "provider returned a conflicting rate: {}", e);
                    return Err(AppError::Conflict(e));
                }
                Err(e) => return Err(e),
            }
        }
        info!(recorded = recorded, %date, "exchange rates refreshed");
        Ok(recorded)
    }

    fn latest_on_or_before(&self, from: &str, to: &str, as_of: NaiveDate) -> Option<Decimal> {
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .and_then(|table| table.range(..=as_of).next_back().map(|(_, rate)| *rate))
    }
}

fn validate_code(code: &str) -> Result<String, AppError> {
    let code = code.trim().to_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(AppError::InvalidCurrency(code))
    }
}
