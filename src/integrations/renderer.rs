//! Invoice rendering.
//!
//! [`InvoiceView`] is everything an invoice shows, frozen from a bill and its
//! computation. A renderer turns it into the bytes of one language-specific artifact.

use crate::{
    core::{calculator::BillComputation, month::month_key},
    entities::MonthlyBillModel,
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// Invoice language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Khmer,
    English,
    French,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Self; 3] = [Self::Khmer, Self::English, Self::French];

    /// Short code used in artifact names.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Khmer => "kh",
            Self::English => "en",
            Self::French => "fr",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kh" | "km" | "khmer" => Ok(Self::Khmer),
            "en" | "english" => Ok(Self::English),
            "fr" | "french" => Ok(Self::French),
            other => Err(Error::Validation {
                message: format!("Unsupported invoice language '{other}' (use kh, en or fr)"),
            }),
        }
    }
}

/// Meter figures for one utility line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLine {
    pub previous: i64,
    pub current: i64,
    pub usage: i64,
    pub unit_price: Decimal,
    pub cost: Decimal,
}

/// Data printed on an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceView {
    pub bill_id: i64,
    pub room_number: String,
    pub tenant_name: String,
    pub month: NaiveDate,
    pub room_price: Decimal,
    pub exchange_rate: Decimal,
    pub room_cost: Decimal,
    pub water: UsageLine,
    pub electricity: UsageLine,
    pub total: Decimal,
}

impl InvoiceView {
    /// Builds the view from a bill and a complete computation.
    ///
    /// Money amounts come from the stored bill, so an issued bill always renders what
    /// was issued. The tenant name is the issue-time snapshot when there is one.
    ///
    /// # Errors
    /// `MissingData` if the computation lacks a rate entry or a reading.
    pub fn build(
        bill: &MonthlyBillModel,
        computation: &BillComputation,
        current_tenant: Option<String>,
    ) -> Result<Self> {
        let missing = || Error::MissingData {
            action: "render".to_string(),
        };
        let rate = computation.rate.as_ref().ok_or_else(missing)?;
        let line = |usage: &crate::core::calculator::UtilityUsage, unit_price, cost| {
            Ok::<_, Error>(UsageLine {
                previous: usage.previous.ok_or_else(missing)?,
                current: usage.current.ok_or_else(missing)?,
                usage: usage.usage,
                unit_price,
                cost,
            })
        };

        Ok(Self {
            bill_id: bill.id,
            room_number: computation.room.room_number.clone(),
            tenant_name: bill
                .tenant_name_snapshot
                .clone()
                .or(current_tenant)
                .unwrap_or_default(),
            month: bill.month,
            room_price: computation.room.price,
            exchange_rate: rate.exchange_rate,
            room_cost: bill.room_cost,
            water: line(&computation.water, rate.water_unit_price, bill.water_cost)?,
            electricity: line(
                &computation.electricity,
                rate.electricity_unit_price,
                bill.electricity_cost,
            )?,
            total: bill.total,
        })
    }

    /// Total converted back to the base currency, rounded to cents.
    #[must_use]
    pub fn total_in_base_currency(&self) -> Decimal {
        if self.exchange_rate.is_zero() {
            return Decimal::ZERO;
        }
        (self.total / self.exchange_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Produces an invoice artifact.
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    /// Renders `view` in `language`.
    async fn render(&self, view: &InvoiceView, language: Language) -> Result<Vec<u8>>;
}

struct Labels {
    title: &'static str,
    room: &'static str,
    tenant: &'static str,
    month: &'static str,
    rent: &'static str,
    water: &'static str,
    electricity: &'static str,
    total: &'static str,
    rate: &'static str,
}

const fn labels(language: Language) -> Labels {
    match language {
        Language::Khmer => Labels {
            title: "វិក្កយបត្រ",
            room: "បន្ទប់",
            tenant: "អ្នកជួល",
            month: "ខែ",
            rent: "ថ្លៃបន្ទប់",
            water: "ទឹក",
            electricity: "អគ្គិសនី",
            total: "សរុប",
            rate: "អត្រាប្តូរប្រាក់",
        },
        Language::English => Labels {
            title: "INVOICE",
            room: "Room",
            tenant: "Tenant",
            month: "Month",
            rent: "Rent",
            water: "Water",
            electricity: "Electricity",
            total: "Total",
            rate: "Exchange rate",
        },
        Language::French => Labels {
            title: "FACTURE",
            room: "Chambre",
            tenant: "Locataire",
            month: "Mois",
            rent: "Loyer",
            water: "Eau",
            electricity: "Électricité",
            total: "Total",
            rate: "Taux de change",
        },
    }
}

/// Renders invoices as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextInvoiceRenderer;

impl TextInvoiceRenderer {
    fn render_text(view: &InvoiceView, language: Language) -> std::result::Result<String, fmt::Error> {
        let l = labels(language);
        let mut out = String::new();
        writeln!(out, "{}", l.title)?;
        writeln!(out, "{}: {}", l.room, view.room_number)?;
        if !view.tenant_name.is_empty() {
            writeln!(out, "{}: {}", l.tenant, view.tenant_name)?;
        }
        writeln!(out, "{}: {}", l.month, month_key(view.month))?;
        writeln!(out, "{}: 1 USD = {} KHR", l.rate, view.exchange_rate.normalize())?;
        writeln!(out)?;
        writeln!(
            out,
            "{}: {} USD = {} KHR",
            l.rent,
            view.room_price.normalize(),
            view.room_cost.normalize()
        )?;
        for (label, line) in [(l.water, &view.water), (l.electricity, &view.electricity)] {
            writeln!(
                out,
                "{label}: {} -> {} = {} x {} = {} KHR",
                line.previous,
                line.current,
                line.usage,
                line.unit_price.normalize(),
                line.cost.normalize()
            )?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "{}: {} KHR ({:.2} USD)",
            l.total,
            view.total.normalize(),
            view.total_in_base_currency()
        )?;
        Ok(out)
    }
}

#[async_trait]
impl InvoiceRenderer for TextInvoiceRenderer {
    async fn render(&self, view: &InvoiceView, language: Language) -> Result<Vec<u8>> {
        Self::render_text(view, language)
            .map(String::into_bytes)
            .map_err(|e| Error::Renderer {
                detail: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calculator;
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_language_parsing() -> Result<()> {
        assert_eq!("KH".parse::<Language>()?, Language::Khmer);
        assert_eq!("english".parse::<Language>()?, Language::English);
        assert_eq!(" fr ".parse::<Language>()?, Language::French);
        assert!("de".parse::<Language>().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_render_english_invoice() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        let computation = calculator::compute(&db, fixture.room.id, fixture.month).await?;
        let view = InvoiceView::build(&bill, &computation, Some("Sokha Chan".to_string()))?;
        assert_eq!(view.total_in_base_currency(), dec!(110));

        let bytes = TextInvoiceRenderer.render(&view, Language::English).await?;
        let text = String::from_utf8(bytes).map_err(|e| Error::Renderer {
            detail: e.to_string(),
        })?;
        assert!(text.starts_with("INVOICE"));
        assert!(text.contains("Room: A1"));
        assert!(text.contains("Tenant: Sokha Chan"));
        assert!(text.contains("Water: 50 -> 60 = 10 x 2000 = 20000 KHR"));
        assert!(text.contains("Total: 440000 KHR (110.00 USD)"));
        Ok(())
    }

    #[tokio::test]
    async fn test_view_requires_complete_data() -> Result<()> {
        let db = setup_test_db().await?;
        let room = create_test_room(&db, "A1", dec!(100)).await?;
        let bill = calculator::recalculate_bill(&db, room.id, test_month()).await?;
        let computation = calculator::compute(&db, room.id, test_month()).await?;

        let result = InvoiceView::build(&bill, &computation, None);
        assert!(matches!(result, Err(Error::MissingData { .. })));
        Ok(())
    }
}
