use std::str::FromStr;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::decimal::ExchangeRate;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::types::{CurrencyCode, RateSide};

use super::RateTable;

/// currency the central-bank sheet quotes every rate in
pub const FEED_QUOTE_CURRENCY: &str = "TRY";

/// fetches a published rate sheet
pub trait FeedTransport {
    /// raw sheet body, or `None` when nothing is published at `url`
    fn fetch(&self, url: &str) -> Option<Vec<u8>>;
}

/// one currency line of a rate sheet, figures per single unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub code: CurrencyCode,
    pub name: String,
    /// quantity the published figures were quoted for
    pub unit: u32,
    pub buying: Decimal,
    /// zero when the sheet has no selling figure
    pub selling: Decimal,
}

impl RateRow {
    pub fn figure(&self, side: RateSide) -> Decimal {
        match side {
            RateSide::Buying => self.buying,
            RateSide::Selling => self.selling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSheet {
    pub date: NaiveDate,
    pub rows: Vec<RateRow>,
}

impl RateSheet {
    pub fn row(&self, code: &CurrencyCode) -> Option<&RateRow> {
        self.rows.iter().find(|row| row.code == *code)
    }

    /// parse a sheet body
    ///
    /// Rows without a usable buying figure are skipped; a missing selling
    /// figure reads as zero.
    pub fn parse(date: NaiveDate, body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body).map_err(|e| EngineError::Feed {
            message: format!("sheet for {} is not utf-8: {}", date, e),
        })?;
        let sheet: XmlSheet = quick_xml::de::from_str(text).map_err(|e| EngineError::Feed {
            message: format!("malformed sheet for {}: {}", date, e),
        })?;

        let rows = sheet
            .currencies
            .into_iter()
            .filter_map(|currency| {
                let code = currency.code.clone();
                let row = currency.into_row();
                if row.is_none() {
                    debug!("skipping sheet row {}", code);
                }
                row
            })
            .collect();

        Ok(Self { date, rows })
    }
}

#[derive(Debug, Deserialize)]
struct XmlSheet {
    #[serde(rename = "Currency", default)]
    currencies: Vec<XmlCurrency>,
}

#[derive(Debug, Deserialize)]
struct XmlCurrency {
    #[serde(rename = "@CurrencyCode")]
    code: String,
    #[serde(rename = "Unit", default)]
    unit: Option<String>,
    #[serde(rename = "Isim", default)]
    name: Option<String>,
    #[serde(rename = "ForexBuying", default)]
    forex_buying: Option<String>,
    #[serde(rename = "ForexSelling", default)]
    forex_selling: Option<String>,
}

impl XmlCurrency {
    fn into_row(self) -> Option<RateRow> {
        let code = CurrencyCode::new(&self.code).ok()?;
        let buying = figure(self.forex_buying.as_deref())??;
        let selling = figure(self.forex_selling.as_deref())?.unwrap_or(Decimal::ZERO);

        let unit = self
            .unit
            .as_deref()
            .and_then(|u| u.trim().parse::<u32>().ok())
            .filter(|u| *u > 0)
            .unwrap_or(1);
        let scale = Decimal::from(unit);

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| code.to_string());

        Some(RateRow {
            code,
            name,
            unit,
            buying: buying / scale,
            selling: selling / scale,
        })
    }
}

/// `Some(None)` for a blank or absent figure, `None` for an unparsable one
fn figure(raw: Option<&str>) -> Option<Option<Decimal>> {
    match raw.map(str::trim) {
        None | Some("") => Some(None),
        Some(text) => Decimal::from_str(text).ok().map(Some),
    }
}

/// sheet address: `today.xml` for the current day, the dated archive otherwise
pub fn sheet_url(base_url: &str, date: NaiveDate, today: NaiveDate) -> String {
    let base = base_url.trim_end_matches('/');
    if date == today {
        format!("{}/today.xml", base)
    } else {
        format!("{}/{}/{}.xml", base, date.format("%Y%m"), date.format("%d%m%Y"))
    }
}

/// central-bank daily rate feed
pub struct CentralBankFeed<T: FeedTransport> {
    base_url: String,
    rate_side: RateSide,
    transport: T,
}

impl<T: FeedTransport> CentralBankFeed<T> {
    pub fn new(config: &FeedConfig, transport: T) -> Self {
        Self {
            base_url: config.base_url.clone(),
            rate_side: config.rate_side,
            transport,
        }
    }

    pub fn rate_side(&self) -> RateSide {
        self.rate_side
    }

    /// look up the sheet for `date` without touching any rate table
    ///
    /// `Ok(None)` when no sheet is published for that day.
    pub fn rates_for(&self, date: NaiveDate, time_provider: &SafeTimeProvider) -> Result<Option<RateSheet>> {
        let today = time_provider.now().date_naive();
        let url = sheet_url(&self.base_url, date, today);

        match self.transport.fetch(&url) {
            Some(body) => {
                let sheet = RateSheet::parse(date, &body)?;
                debug!("fetched {} rows from {}", sheet.rows.len(), url);
                Ok(Some(sheet))
            }
            None => {
                debug!("no rate sheet published at {}", url);
                Ok(None)
            }
        }
    }

    /// write the configured side of the sheet for `date` into `table`
    ///
    /// Only currencies the table tracks are written. Returns the codes that
    /// were updated.
    pub fn sync(
        &self,
        date: NaiveDate,
        table: &mut RateTable,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<Vec<CurrencyCode>> {
        let quote = CurrencyCode::new(FEED_QUOTE_CURRENCY)?;
        if *table.base() != quote {
            warn!(
                "rate table base {} is not {}, skipping sync",
                table.base(),
                quote
            );
            return Ok(Vec::new());
        }

        let Some(sheet) = self.rates_for(date, time_provider)? else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in &sheet.rows {
            if !table.is_tracked(&row.code) {
                continue;
            }
            let Some(rate) = ExchangeRate::new(row.figure(self.rate_side)) else {
                continue;
            };
            table.set_rate(row.code.clone(), date, rate);
            updated.push(row.code.clone());
        }

        if !updated.is_empty() {
            info!("synced {} rates for {}", updated.len(), date);
            events.emit(Event::RatesSynced {
                rate_date: date,
                currencies: updated.clone(),
                timestamp: time_provider.now(),
            });
        }

        Ok(updated)
    }
}
