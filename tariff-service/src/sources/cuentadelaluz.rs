//! Extractor for the public tariff page at cuentadelaluz.cl.
//!
//! The page is meant for people and is rendered by script: a
//! `<select id="comuna">` lists the regions, `#buttonSearch` runs the search
//! in place, and each provider then appears inside `.epf-info-container` as
//! an `.info-card` made of `.info-row` lines such as
//!
//! ```html
//! <div class="info-row"><strong>Distribuidora:</strong> <span>ENEL</span></div>
//! <div class="info-row"><strong>Cargo Fijo:</strong> <span>$1.033,45</span></div>
//! <div class="info-row"><strong>Consumo hasta 350 kWh:</strong> <span>$159,21</span></div>
//! ```
//!
//! The search is driven in a headless Chrome page. Rows are classified by
//! their visible text only, so the rest of the service never depends on
//! this markup.

use std::time::{Duration, Instant};

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use scraper::{ElementRef, Html, Selector};
use tariff_client::domain::{normalize_region_name, ProviderGroup, TierPrice};
use tokio::task::JoinHandle;

use super::{locale::parse_locale_amount, ExtractionError, TariffExtractor};
use crate::config::SourceConfig;

const REGION_SELECT: &str = "select#comuna";
const SEARCH_BUTTON: &str = "#buttonSearch";
const RESULTS_CONTAINER: &str = ".epf-info-container";
const CARD: &str = ".info-card";
const ROW: &str = ".info-row";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The handful of page interactions a search needs.
#[async_trait::async_trait]
trait PageDriver: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), ExtractionError>;

    /// Current DOM serialized as HTML.
    async fn html(&self) -> Result<String, ExtractionError>;

    /// Set the value of a `<select>` and fire its `change` event.
    async fn select_option(&self, select: &str, value: &str) -> Result<(), ExtractionError>;

    async fn click(&self, selector: &str) -> Result<(), ExtractionError>;
}

#[derive(Debug, Clone, Copy)]
struct SearchTimings {
    navigation: Duration,
    result: Duration,
    settle: Duration,
    poll: Duration,
}

impl SearchTimings {
    fn from_config(config: &SourceConfig) -> Self {
        Self {
            navigation: config.navigation_timeout(),
            result: config.result_timeout(),
            settle: config.settle_delay(),
            poll: POLL_INTERVAL,
        }
    }
}

pub struct CuentaDeLaLuzExtractor {
    config: SourceConfig,
}

impl CuentaDeLaLuzExtractor {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl TariffExtractor for CuentaDeLaLuzExtractor {
    async fn extract(&self, region: &str) -> Result<Vec<ProviderGroup>, ExtractionError> {
        let session = BrowserSession::launch(&self.config, region).await?;

        let result = match session.new_page().await {
            Ok(page) => {
                let page = ChromePage { page };
                search_region(&page, &self.config.base_url, region, SearchTimings::from_config(&self.config)).await
            }
            Err(e) => Err(e),
        };

        session.close().await;
        result
    }
}

/// One headless browser for one extraction. Dropping it stops the CDP
/// handler, whichever way the extraction ends.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    region: String,
    opened_at: Instant,
}

impl BrowserSession {
    async fn launch(config: &SourceConfig, region: &str) -> Result<Self, ExtractionError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .request_timeout(config.navigation_timeout());
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(ExtractionError::Launch)?;

        let (browser, mut events) = Browser::launch(browser_config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::debug!(region, "browser session opened");
        Ok(Self {
            browser,
            handler,
            region: region.to_string(),
            opened_at: Instant::now(),
        })
    }

    async fn new_page(&self) -> Result<Page, ExtractionError> {
        Ok(self.browser.new_page("about:blank").await?)
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(region = %self.region, error = %e, "browser did not close cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(region = %self.region, error = %e, "failed to reap browser process");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        tracing::debug!(
            region = %self.region,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "browser session released"
        );
    }
}

struct ChromePage {
    page: Page,
}

#[async_trait::async_trait]
impl PageDriver for ChromePage {
    async fn open(&self, url: &str) -> Result<(), ExtractionError> {
        self.page.goto(url.to_string()).await?;
        Ok(())
    }

    async fn html(&self) -> Result<String, ExtractionError> {
        Ok(self.page.content().await?)
    }

    async fn select_option(&self, select: &str, value: &str) -> Result<(), ExtractionError> {
        self.page.evaluate(select_option_script(select, value)?).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), ExtractionError> {
        self.page.find_element(selector).await?.click().await?;
        Ok(())
    }
}

/// Script that picks `value` in `select` the way a person would, so the
/// page's own `change` listeners run.
fn select_option_script(select: &str, value: &str) -> Result<String, ExtractionError> {
    let select = serde_json::to_string(select).map_err(|e| ExtractionError::Markup(e.to_string()))?;
    let value = serde_json::to_string(value).map_err(|e| ExtractionError::Markup(e.to_string()))?;
    Ok(format!(
        "(() => {{ const s = document.querySelector({select}); \
         s.value = {value}; \
         s.dispatchEvent(new Event('change', {{ bubbles: true }})); }})()"
    ))
}

/// Drive one search: load the page, pick the region, run the search and
/// wait for the results to be rendered in the same page.
async fn search_region<P: PageDriver + ?Sized>(
    page: &P,
    base_url: &str,
    region: &str,
    timings: SearchTimings,
) -> Result<Vec<ProviderGroup>, ExtractionError> {
    tracing::info!(region, url = base_url, "loading tariff page");
    tokio::time::timeout(timings.navigation, page.open(base_url))
        .await
        .map_err(|_| ExtractionError::NavigationTimeout(timings.navigation))??;

    let landing = wait_for_selector(page, REGION_SELECT, timings.navigation, timings.poll)
        .await?
        .ok_or(ExtractionError::NavigationTimeout(timings.navigation))?;

    let value = region_option_value(&landing, region)?;
    page.select_option(REGION_SELECT, &value).await?;

    // Give the page the same pause a person would before searching.
    tokio::time::sleep(timings.settle).await;

    page.click(SEARCH_BUTTON).await?;

    let results = wait_for_selector(page, RESULTS_CONTAINER, timings.result, timings.poll)
        .await?
        .ok_or(ExtractionError::ResultTimeout(timings.result))?;
    let groups = parse_results(&results)?.ok_or(ExtractionError::ResultTimeout(timings.result))?;

    tracing::info!(region, providers = groups.len(), "tariff page parsed");
    Ok(groups)
}

/// Poll the page until `css` matches, returning the HTML that matched.
/// `Ok(None)` means `limit` elapsed first.
async fn wait_for_selector<P: PageDriver + ?Sized>(
    page: &P,
    css: &str,
    limit: Duration,
    poll: Duration,
) -> Result<Option<String>, ExtractionError> {
    let deadline = tokio::time::Instant::now() + limit;

    loop {
        let html = page.html().await?;
        if contains_selector(&html, css)? {
            return Ok(Some(html));
        }
        if tokio::time::Instant::now() + poll > deadline {
            return Ok(None);
        }
        tokio::time::sleep(poll).await;
    }
}

fn contains_selector(html: &str, css: &str) -> Result<bool, ExtractionError> {
    let wanted = selector(css)?;
    Ok(Html::parse_document(html).select(&wanted).next().is_some())
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Markup(format!("bad selector '{css}': {e}")))
}

/// Visible text of an element with runs of whitespace collapsed.
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value of the region option whose trimmed, case-folded text equals
/// `region`.
fn region_option_value(html: &str, region: &str) -> Result<String, ExtractionError> {
    let document = Html::parse_document(html);
    let select_sel = selector(REGION_SELECT)?;
    let option_sel = selector("option")?;

    let select = document
        .select(&select_sel)
        .next()
        .ok_or_else(|| ExtractionError::Markup(format!("region list '{REGION_SELECT}' not found")))?;

    let wanted = normalize_region_name(region);
    let option = select
        .select(&option_sel)
        .find(|opt| normalize_region_name(&element_text(opt)) == wanted)
        .ok_or_else(|| ExtractionError::RegionNotFound(region.trim().to_string()))?;

    Ok(match option.value().attr("value") {
        Some(v) => v.to_string(),
        None => element_text(&option),
    })
}

/// Parse every provider card of a results page.
///
/// Returns `Ok(None)` when the results container is absent, i.e. the search
/// never produced results.
fn parse_results(html: &str) -> Result<Option<Vec<ProviderGroup>>, ExtractionError> {
    let document = Html::parse_document(html);
    let container_sel = selector(RESULTS_CONTAINER)?;
    if document.select(&container_sel).next().is_none() {
        return Ok(None);
    }

    let card_sel = selector(CARD)?;
    let row_sel = selector(ROW)?;
    let label_sel = selector("strong")?;
    let value_sel = selector("span")?;

    let groups = document
        .select(&card_sel)
        .map(|card| parse_card(card, &row_sel, &label_sel, &value_sel))
        .collect();

    Ok(Some(groups))
}

fn parse_card(card: ElementRef<'_>, row_sel: &Selector, label_sel: &Selector, value_sel: &Selector) -> ProviderGroup {
    let mut group = ProviderGroup {
        provider_name: None,
        fixed_charge: 0.0,
        tiers: Vec::new(),
    };

    for row in card.select(row_sel) {
        let text = element_text(&row);
        let label = row
            .select(label_sel)
            .next()
            .map(|l| element_text(&l))
            .unwrap_or_default();

        if label.contains("Distribuidora") {
            let name = text.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or_default();
            if !name.is_empty() {
                group.provider_name = Some(name.to_string());
            }
        } else if label.contains("Cargo Fijo") {
            let raw = row
                .select(value_sel)
                .next()
                .map(|v| element_text(&v))
                .or_else(|| text.split_once(':').map(|(_, rest)| rest.to_string()));
            group.fixed_charge = raw.as_deref().and_then(parse_locale_amount).unwrap_or(0.0);
        } else if text.contains("kWh") && text.contains(':') {
            let Some((tier_label, price)) = text.split_once(':') else {
                continue;
            };
            let tier_label = tier_label.trim();
            match parse_locale_amount(price) {
                Some(unit_price) if !tier_label.is_empty() => group.tiers.push(TierPrice {
                    tier_label: tier_label.to_string(),
                    unit_price,
                }),
                _ => {
                    tracing::debug!(row = %text, "skipping tier row without a usable price");
                }
            }
        }
    }

    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const LANDING: &str = r#"
        <html><body>
          <select id="comuna" name="comuna">
            <option value="">Seleccione</option>
            <option value="101">Ancud </option>
            <option value="102">  Algarrobo</option>
            <option value="103">Puerto Montt</option>
          </select>
          <button id="buttonSearch" type="button">Buscar</button>
          <div id="resultados"></div>
        </body></html>
    "#;

    const RESULTS: &str = r#"
        <html><body>
          <div class="epf-info-container">
            <div class="info-card">
              <div class="info-row"><strong>Distribuidora:</strong> <span>ENEL</span></div>
              <div class="info-row"><strong>Cargo Fijo:</strong> <span>$1.033,45</span></div>
              <div class="info-row"><strong>Consumo hasta 350 kWh:</strong> <span>$159,21</span></div>
              <div class="info-row"><strong>Consumo sobre 350 kWh:</strong> <span>$187,50</span></div>
              <div class="info-row"><strong>Energía adicional kWh:</strong> <span>no informado</span></div>
            </div>
            <div class="info-card">
              <div class="info-row"><strong>Distribuidora:</strong> <span>CGE</span></div>
              <div class="info-row"><strong>Cargo Fijo:</strong> <span>sin dato</span></div>
              <div class="info-row"><strong>BT1 kWh:</strong> <span>$120</span></div>
              <div class="info-row"><strong>Nota</strong> <span>precios con IVA</span></div>
            </div>
          </div>
        </body></html>
    "#;

    /// In-page search: the results replace the landing DOM once the search
    /// button is clicked after a region was selected. No navigation happens.
    #[derive(Default)]
    struct ScriptedPage {
        results: Option<&'static str>,
        events: Mutex<Vec<String>>,
        selected: Mutex<Option<String>>,
        searched: Mutex<bool>,
    }

    impl ScriptedPage {
        fn rendering(results: &'static str) -> Self {
            Self {
                results: Some(results),
                ..Default::default()
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageDriver for ScriptedPage {
        async fn open(&self, url: &str) -> Result<(), ExtractionError> {
            self.events.lock().unwrap().push(format!("open {url}"));
            Ok(())
        }

        async fn html(&self) -> Result<String, ExtractionError> {
            let searched = *self.searched.lock().unwrap();
            match self.results {
                Some(results) if searched => Ok(results.to_string()),
                _ => Ok(LANDING.to_string()),
            }
        }

        async fn select_option(&self, select: &str, value: &str) -> Result<(), ExtractionError> {
            self.events.lock().unwrap().push(format!("select {select}={value}"));
            *self.selected.lock().unwrap() = Some(value.to_string());
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<(), ExtractionError> {
            self.events.lock().unwrap().push(format!("click {selector}"));
            let selected = self.selected.lock().unwrap().is_some();
            *self.searched.lock().unwrap() = selected;
            Ok(())
        }
    }

    fn timings() -> SearchTimings {
        SearchTimings {
            navigation: Duration::from_millis(200),
            result: Duration::from_millis(100),
            settle: Duration::from_millis(1),
            poll: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn results_rendered_in_place_after_search_are_extracted() {
        let page = ScriptedPage::rendering(RESULTS);

        let groups = search_region(&page, "https://tarifas.test/", " ancud", timings())
            .await
            .expect("search should succeed");

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].provider_name.as_deref(), Some("ENEL"));
        assert_eq!(
            page.events(),
            ["open https://tarifas.test/", "select select#comuna=101", "click #buttonSearch"]
        );
    }

    #[tokio::test]
    async fn results_that_never_render_time_out() {
        let page = ScriptedPage::default();

        let res = search_region(&page, "https://tarifas.test/", "Ancud", timings()).await;

        assert!(matches!(res, Err(ExtractionError::ResultTimeout(d)) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn unknown_region_stops_before_searching() {
        let page = ScriptedPage::rendering(RESULTS);

        let res = search_region(&page, "https://tarifas.test/", "Atlantis", timings()).await;

        assert!(matches!(res, Err(ExtractionError::RegionNotFound(name)) if name == "Atlantis"));
        assert_eq!(page.events(), ["open https://tarifas.test/"]);
    }

    #[test]
    fn select_script_quotes_its_arguments() {
        let script = select_option_script("select#comuna", r#"10"1"#).unwrap();
        assert!(script.contains(r#"document.querySelector("select#comuna")"#));
        assert!(script.contains(r#"s.value = "10\"1";"#));
        assert!(script.contains("new Event('change'"));
    }

    #[test]
    fn region_option_matches_trimmed_case_folded_text() {
        assert_eq!(region_option_value(LANDING, "  ancud").unwrap(), "101");
        assert_eq!(region_option_value(LANDING, "ALGARROBO").unwrap(), "102");
    }

    #[test]
    fn partial_region_names_do_not_match() {
        let res = region_option_value(LANDING, "Puerto");
        assert!(matches!(res, Err(ExtractionError::RegionNotFound(name)) if name == "Puerto"));
    }

    #[test]
    fn page_without_region_list_is_a_markup_error() {
        let res = region_option_value("<html><body><p>mantención</p></body></html>", "Ancud");
        assert!(matches!(res, Err(ExtractionError::Markup(_))));
    }

    #[test]
    fn option_without_value_uses_its_text() {
        let html = r#"<select id="comuna"><option> Colina </option></select>"#;
        assert_eq!(region_option_value(html, "colina").unwrap(), "Colina");
    }

    #[test]
    fn cards_yield_provider_fixed_charge_and_tiers() {
        let groups = parse_results(RESULTS).unwrap().expect("results container present");
        assert_eq!(groups.len(), 2);

        let enel = &groups[0];
        assert_eq!(enel.provider_name.as_deref(), Some("ENEL"));
        assert!((enel.fixed_charge - 1033.45).abs() < 1e-9);
        assert_eq!(enel.tiers.len(), 2);
        assert_eq!(enel.tiers[0].tier_label, "Consumo hasta 350 kWh");
        assert!((enel.tiers[0].unit_price - 159.21).abs() < 1e-9);
        assert!((enel.tiers[1].unit_price - 187.5).abs() < 1e-9);
    }

    #[test]
    fn unparseable_fixed_charge_defaults_to_zero() {
        let groups = parse_results(RESULTS).unwrap().expect("results container present");
        let cge = &groups[1];
        assert_eq!(cge.provider_name.as_deref(), Some("CGE"));
        assert_eq!(cge.fixed_charge, 0.0);
        assert_eq!(cge.tiers.len(), 1);
        assert_eq!(cge.tiers[0].unit_price, 120.0);
    }

    #[test]
    fn card_without_provider_row_stays_unnamed() {
        let html = r#"
            <div class="epf-info-container">
              <div class="info-card">
                <div class="info-row"><strong>Tarifa:</strong> <span>BT1</span></div>
                <div class="info-row"><strong>Base kWh:</strong> <span>$100</span></div>
              </div>
            </div>
        "#;
        let groups = parse_results(html).unwrap().expect("results container present");
        assert_eq!(groups[0].provider_name, None);
        assert_eq!(groups[0].tiers.len(), 1);
    }

    #[test]
    fn empty_container_is_no_data_not_failure() {
        let html = r#"<div class="epf-info-container"></div>"#;
        let groups = parse_results(html).unwrap();
        assert_eq!(groups, Some(Vec::new()));
    }

    #[test]
    fn missing_container_means_results_never_appeared() {
        let html = r#"<div class="info-card"><div class="info-row">Base kWh: $1</div></div>"#;
        assert_eq!(parse_results(html).unwrap(), None);
    }
}
