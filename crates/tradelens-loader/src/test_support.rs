//! Scripted transport and canned provider payloads for exercising the loader
//! without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::http_client::{HttpClient, HttpRequest, HttpResponse, TransportError};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(TransportError),
    Hang(Duration),
}

/// Replies to each URL from its own queue, in push order. A URL with nothing
/// queued answers 404.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self, url: &str, reply: Scripted) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.entry(url.to_string()).or_default().push_back(reply);
        }
    }

    pub fn push(&self, url: &str, response: HttpResponse) {
        self.enqueue(url, Scripted::Respond(response));
    }

    pub fn push_json(&self, url: &str, body: impl Into<String>) {
        self.push(
            url,
            HttpResponse::ok(body).with_header("content-type", "application/json"),
        );
    }

    pub fn push_status(&self, url: &str, status: u16) {
        self.push(url, HttpResponse::new(status, ""));
    }

    pub fn push_transport_error(&self, url: &str, error: TransportError) {
        self.enqueue(url, Scripted::Fail(error));
    }

    /// Sleeps before answering 200, so the caller's timeout fires first.
    pub fn push_hang(&self, url: &str, delay: Duration) {
        self.enqueue(url, Scripted::Hang(delay));
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| c.as_str() == url).count())
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.url.clone());
        }
        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.get_mut(&request.url).and_then(VecDeque::pop_front));

        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse::ok("null"))
            }
            None => Ok(HttpResponse::new(404, "no scripted response")),
        }
    }
}

/// Provider payloads shaped like the live APIs.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::sources::world_bank::{self, WorldBankQuery};

    pub const FRANKFURTER_LATEST_USD: &str =
        r#"{"amount":1.0,"base":"USD","date":"2024-01-05","rates":{"CNY":7.1642,"INR":83.17}}"#;

    pub const FRANKFURTER_SERIES_USD: &str = r#"{
        "amount": 1.0, "base": "USD", "start_date": "2024-01-02", "end_date": "2024-01-04",
        "rates": {
            "2024-01-02": {"INR": 83.32, "CNY": 7.1124},
            "2024-01-03": {"INR": 83.25, "CNY": 7.1426},
            "2024-01-04": {"INR": 83.21}
        }
    }"#;

    pub const WITS_FLAT: &str = r#"[
        {"reporter": "IND", "partner": "CHN", "year": "2020", "product": "Total",
         "indicator": "MPRT-TRD-VL", "value": 65212000000.0},
        {"reporter": "IND", "partner": "CHN", "year": "2021", "product": "Total",
         "indicator": "MPRT-TRD-VL", "value": 87672000000.0},
        {"reporter": "IND", "partner": "CHN", "year": "2022", "product": "Total",
         "indicator": "MPRT-TRD-VL", "value": null}
    ]"#;

    pub const WITS_SDMX: &str = r#"{
        "structure": {
            "dimensions": {
                "series": [
                    {"id": "REPORTER", "values": [{"id": "IND", "name": "India"}]},
                    {"id": "PARTNER", "values": [{"id": "CHN", "name": "China"}, {"id": "USA", "name": "United States"}]},
                    {"id": "PRODUCTCODE", "values": [{"id": "Total", "name": "All Products"}]},
                    {"id": "INDICATOR", "values": [{"id": "XPRT-TRD-VL", "name": "Export (US$ Thousand)"}]}
                ],
                "observation": [
                    {"id": "TIME_PERIOD", "values": [{"id": "2020", "name": "2020"}, {"id": "2021", "name": "2021"}]}
                ]
            }
        },
        "dataSets": [{
            "series": {
                "0:0:0:0": {"observations": {"0": [18906.0], "1": [23111.0]}},
                "0:1:0:0": {"observations": {"0": [51622.0], "1": [71485.0]}}
            }
        }]
    }"#;

    pub const COMTRADE_WRAPPED: &str = r#"{
        "elapsedTime": "0.12 secs", "count": 2, "error": "",
        "data": [
            {"reporterISO": "IND", "partnerISO": "W00", "period": "2022", "freqCode": "A",
             "flowCode": "M", "cmdCode": "TOTAL", "cmdDesc": "All Commodities", "primaryValue": 723000000000.0},
            {"reporterISO": "IND", "partnerISO": "W00", "period": "2022", "freqCode": "A",
             "flowCode": "X", "cmdCode": "TOTAL", "cmdDesc": "All Commodities", "primaryValue": 453000000000.0}
        ]
    }"#;

    pub const GDP_INDICATOR: &str = "NY.GDP.MKTP.CD";
    pub const WB_FIRST_YEAR: i32 = 2000;
    pub const WB_LAST_YEAR: i32 = 2024;
    pub const WB_PAGES: u32 = 2;
    const WB_PER_PAGE: usize = 13;

    /// Synthetic GDP. The latest year is unpublished everywhere; India also
    /// has a gap in 2003.
    pub fn gdp_value(country: &str, year: i32) -> Option<f64> {
        let (base, growth, gaps): (f64, f64, &[i32]) = match country {
            "IND" => (4.68e11, 1.09, &[2003, 2024]),
            "CHN" => (1.21e12, 1.12, &[2024]),
            _ => (1.0e11, 1.03, &[2024]),
        };
        if gaps.contains(&year) {
            return None;
        }
        Some(base * growth.powi(year - WB_FIRST_YEAR))
    }

    pub fn gdp_non_null(country: &str) -> usize {
        (WB_FIRST_YEAR..=WB_LAST_YEAR)
            .filter(|y| gdp_value(country, *y).is_some())
            .count()
    }

    fn country_name(country: &str) -> &'static str {
        match country {
            "IND" => "India",
            "CHN" => "China",
            _ => "Unknown",
        }
    }

    /// One page of `[meta, rows]`, newest year first as the live API orders it.
    pub fn world_bank_gdp_page(country: &str, page: u32) -> String {
        let years: Vec<i32> = (WB_FIRST_YEAR..=WB_LAST_YEAR).rev().collect();
        let rows: Vec<Value> = years
            .chunks(WB_PER_PAGE)
            .nth(page.saturating_sub(1) as usize)
            .unwrap_or(&[])
            .iter()
            .map(|year| {
                json!({
                    "indicator": {"id": GDP_INDICATOR, "value": "GDP (current US$)"},
                    "country": {"id": &country[..2], "value": country_name(country)},
                    "countryiso3code": country,
                    "date": year.to_string(),
                    "value": gdp_value(country, *year),
                    "unit": "",
                    "obs_status": "",
                    "decimal": 0
                })
            })
            .collect();
        json!([
            {
                "page": page,
                "pages": WB_PAGES,
                "per_page": WB_PER_PAGE,
                "total": years.len(),
                "sourceid": "2",
                "lastupdated": "2025-07-01"
            },
            rows
        ])
        .to_string()
    }

    /// `(url, body)` for every page of a country's GDP series.
    pub fn world_bank_gdp(base: &str, per_page: u32, country: &str) -> Vec<(String, String)> {
        let query = WorldBankQuery::new(country, GDP_INDICATOR);
        (1..=WB_PAGES)
            .map(|page| {
                (
                    world_bank::query_url(base, &query, per_page, page),
                    world_bank_gdp_page(country, page),
                )
            })
            .collect()
    }
}
