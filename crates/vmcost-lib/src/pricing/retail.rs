//! Azure Retail Prices API client and price normalization

use super::PriceSource;
use crate::models::{BillingClass, PriceQuote};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Public Retail Prices endpoint
pub const DEFAULT_PRICING_ENDPOINT: &str = "https://prices.azure.com/api/retail/prices";

const HOURS_PER_YEAR: f64 = 8760.0;
const HOURS_PER_THREE_YEARS: f64 = 26280.0;
const MAX_PAGES: usize = 50;

/// One meter from the Retail Prices API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailPriceItem {
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub retail_price: f64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub arm_region_name: String,
    #[serde(default)]
    pub arm_sku_name: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub sku_name: String,
    #[serde(default)]
    pub meter_name: String,
    /// `Consumption`, `Reservation` or `DevTestConsumption`
    #[serde(default, rename = "type")]
    pub price_type: String,
    #[serde(default)]
    pub reservation_term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetailPricePage {
    #[serde(rename = "Items", default)]
    items: Vec<RetailPriceItem>,
    #[serde(rename = "NextPageLink", default)]
    next_page_link: Option<String>,
}

/// Client for the unauthenticated Retail Prices API
pub struct RetailPriceClient {
    client: Client,
    endpoint: Url,
}

impl RetailPriceClient {
    /// Create a new client
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = Url::parse(endpoint).context("Invalid pricing endpoint")?;

        Ok(Self { client, endpoint })
    }

    fn filter(region: &str, size: &str) -> String {
        format!(
            "serviceName eq 'Virtual Machines' and armRegionName eq '{}' and armSkuName eq '{}'",
            region.replace('\'', "''"),
            size.replace('\'', "''")
        )
    }

    async fn get_page(&self, url: Url) -> Result<RetailPricePage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send pricing request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pricing API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse pricing response")
    }
}

#[async_trait]
impl PriceSource for RetailPriceClient {
    async fn fetch(&self, region: &str, size: &str) -> Result<Vec<RetailPriceItem>> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("$filter", &Self::filter(region, size));

        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                anyhow::bail!("Pricing query for {} {} exceeded {} pages", region, size, MAX_PAGES);
            }
            let page = self.get_page(page_url).await?;
            items.extend(page.items);
            if let Some(link) = page.next_page_link.filter(|l| !l.is_empty()) {
                next = Some(Url::parse(&link).context("Invalid NextPageLink")?);
            }
        }

        debug!(region = %region, size = %size, items = items.len(), "Fetched retail prices");
        Ok(items)
    }
}

/// Rates of one product series (base or Windows)
#[derive(Debug, Default)]
struct Series {
    payg: Option<f64>,
    spot: Option<f64>,
    low_priority: Option<f64>,
    ri1y: Option<f64>,
    ri3y: Option<f64>,
}

impl Series {
    fn collect<'a>(items: impl Iterator<Item = &'a RetailPriceItem>) -> Self {
        let mut series = Series::default();
        for item in items {
            let slot = match item.price_type.as_str() {
                "Consumption" if item.sku_name.contains("Spot") => &mut series.spot,
                "Consumption" if item.sku_name.contains("Low Priority") => &mut series.low_priority,
                "Consumption" => &mut series.payg,
                "Reservation" => match item.reservation_term.as_deref() {
                    Some("1 Year") => {
                        series.ri1y.get_or_insert(item.retail_price / HOURS_PER_YEAR);
                        continue;
                    }
                    Some("3 Years") => {
                        series.ri3y.get_or_insert(item.retail_price / HOURS_PER_THREE_YEARS);
                        continue;
                    }
                    _ => continue,
                },
                _ => continue,
            };
            slot.get_or_insert(item.retail_price);
        }
        series
    }
}

/// Build the quote for one billing class from the meters of a (region, size).
///
/// Meters whose product name mentions Windows form the Windows series, all
/// others the base series. Reservation prices are whole-term prices and are
/// spread over the hours of the term. Returns `None` when the class has no
/// pay-as-you-go rate.
pub fn quote_from_items(items: &[RetailPriceItem], class: BillingClass) -> Option<PriceQuote> {
    let base = Series::collect(items.iter().filter(|i| !i.product_name.contains("Windows")));
    let windows = Series::collect(items.iter().filter(|i| i.product_name.contains("Windows")));

    let currency = items
        .iter()
        .find_map(|i| i.currency_code.clone())
        .unwrap_or_else(|| "USD".to_string());

    match class {
        BillingClass::Linux => {
            let payg = base.payg?;
            Some(PriceQuote {
                currency,
                payg_hourly: Some(payg),
                ri1y_hourly: base.ri1y,
                ri3y_hourly: base.ri3y,
                spot_hourly: base.spot,
                low_priority_hourly: base.low_priority,
                windows_license_hourly: None,
            })
        }
        BillingClass::Windows => {
            let payg = windows.payg?;
            let license = base.payg.map(|b| (payg - b).max(0.0));
            Some(PriceQuote {
                currency,
                payg_hourly: Some(payg),
                ri1y_hourly: base.ri1y.or(windows.ri1y),
                ri3y_hourly: base.ri3y.or(windows.ri3y),
                spot_hourly: windows.spot,
                low_priority_hourly: windows.low_priority,
                windows_license_hourly: license,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn item(product: &str, sku: &str, kind: &str, term: Option<&str>, price: f64) -> RetailPriceItem {
        RetailPriceItem {
            currency_code: Some("USD".into()),
            retail_price: price,
            unit_price: price,
            arm_region_name: "eastus".into(),
            arm_sku_name: "Standard_D2s_v3".into(),
            product_name: product.into(),
            sku_name: sku.into(),
            meter_name: sku.into(),
            price_type: kind.into(),
            reservation_term: term.map(|t| t.to_string()),
        }
    }

    fn d2s_items() -> Vec<RetailPriceItem> {
        vec![
            item("Virtual Machines DSv3 Series", "D2s v3", "Consumption", None, 0.096),
            item("Virtual Machines DSv3 Series", "D2s v3", "DevTestConsumption", None, 0.05),
            item("Virtual Machines DSv3 Series", "D2s v3 Spot", "Consumption", None, 0.02),
            item("Virtual Machines DSv3 Series", "D2s v3 Low Priority", "Consumption", None, 0.019),
            item("Virtual Machines DSv3 Series", "D2s v3", "Reservation", Some("1 Year"), 525.6),
            item("Virtual Machines DSv3 Series", "D2s v3", "Reservation", Some("3 Years"), 1051.2),
            item("Virtual Machines DSv3 Series Windows", "D2s v3", "Consumption", None, 0.188),
            item("Virtual Machines DSv3 Series Windows", "D2s v3 Spot", "Consumption", None, 0.04),
        ]
    }

    #[test]
    fn test_linux_quote() {
        let quote = quote_from_items(&d2s_items(), BillingClass::Linux).unwrap();
        assert_eq!(quote.payg_hourly, Some(0.096));
        assert!((quote.ri1y_hourly.unwrap() - 0.06).abs() < 1e-9);
        assert!((quote.ri3y_hourly.unwrap() - 0.04).abs() < 1e-9);
        assert_eq!(quote.spot_hourly, Some(0.02));
        assert_eq!(quote.low_priority_hourly, Some(0.019));
        assert_eq!(quote.windows_license_hourly, None);
        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn test_windows_quote_uses_base_reservations() {
        let quote = quote_from_items(&d2s_items(), BillingClass::Windows).unwrap();
        assert_eq!(quote.payg_hourly, Some(0.188));
        assert!((quote.ri1y_hourly.unwrap() - 0.06).abs() < 1e-9);
        assert!((quote.windows_license_hourly.unwrap() - 0.092).abs() < 1e-9);
        assert_eq!(quote.spot_hourly, Some(0.04));
        assert_eq!(quote.low_priority_hourly, None);
    }

    #[test]
    fn test_missing_payg_yields_no_quote() {
        let items = vec![item("Virtual Machines DSv3 Series", "D2s v3", "Reservation", Some("1 Year"), 500.0)];
        assert!(quote_from_items(&items, BillingClass::Linux).is_none());
        assert!(quote_from_items(&[], BillingClass::Windows).is_none());
    }

    #[test]
    fn test_license_floor_is_zero() {
        let items = vec![
            item("Virtual Machines BS Series", "B2s", "Consumption", None, 0.05),
            item("Virtual Machines BS Series Windows", "B2s", "Consumption", None, 0.04),
        ];
        let quote = quote_from_items(&items, BillingClass::Windows).unwrap();
        assert_eq!(quote.windows_license_hourly, Some(0.0));
    }

    #[test]
    fn test_item_deserializes_from_api_shape() {
        let raw = r#"{
            "currencyCode": "USD", "tierMinimumUnits": 0.0, "retailPrice": 0.096,
            "unitPrice": 0.096, "armRegionName": "eastus", "location": "US East",
            "meterName": "D2s v3", "productName": "Virtual Machines DSv3 Series",
            "skuName": "D2s v3", "serviceName": "Virtual Machines",
            "unitOfMeasure": "1 Hour", "type": "Consumption", "armSkuName": "Standard_D2s_v3"
        }"#;
        let parsed: RetailPriceItem = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.price_type, "Consumption");
        assert_eq!(parsed.arm_sku_name, "Standard_D2s_v3");
        assert!(parsed.reservation_term.is_none());
    }

    #[tokio::test]
    async fn test_fetch_follows_next_page_link() {
        let mut server = mockito::Server::new_async().await;
        let next = format!("{}/api/retail/prices?$skip=100", server.url());

        server
            .mock("GET", "/api/retail/prices")
            .match_query(Matcher::UrlEncoded("$skip".into(), "100".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "Items": [{"productName": "Virtual Machines DSv3 Series Windows",
                               "skuName": "D2s v3", "type": "Consumption", "retailPrice": 0.188}],
                    "NextPageLink": null
                })
                .to_string(),
            )
            .create_async()
            .await;
        let first = server
            .mock("GET", "/api/retail/prices")
            .match_query(Matcher::UrlEncoded(
                "$filter".into(),
                "serviceName eq 'Virtual Machines' and armRegionName eq 'eastus' and armSkuName eq 'Standard_D2s_v3'".into(),
            ))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "Items": [{"productName": "Virtual Machines DSv3 Series",
                               "skuName": "D2s v3", "type": "Consumption", "retailPrice": 0.096}],
                    "NextPageLink": next
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = RetailPriceClient::new(
            &format!("{}/api/retail/prices", server.url()),
            Duration::from_secs(5),
        )
        .unwrap();
        let items = client.fetch("eastus", "Standard_D2s_v3").await.unwrap();

        assert_eq!(items.len(), 2);
        first.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_reports_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/retail/prices")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("Invalid OData parameters")
            .create_async()
            .await;

        let client = RetailPriceClient::new(
            &format!("{}/api/retail/prices", server.url()),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.fetch("eastus", "Standard_D2s_v3").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
