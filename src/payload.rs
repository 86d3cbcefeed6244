//! Request bodies for the Allscreenshots API, built from typed option bags.
//!
//! Only options the user actually set are sent. Unset options stay absent so
//! the vendor applies its own defaults.

use serde::Deserialize;
use serde_json::{json, Map, Value};

const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

fn non_zero(n: Option<f64>) -> Option<f64> {
    n.filter(|n| *n != 0.0)
}

/// Split a newline-separated list, dropping blank lines.
pub fn split_lines(s: &str) -> Vec<&str> {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

fn split_commas(s: &str) -> Vec<&str> {
    s.split(',').map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Viewport object with fallback dimensions, sent when either side is set.
fn sized_viewport(width: Option<u32>, height: Option<u32>) -> Option<Value> {
    let width = width.filter(|w| *w > 0);
    let height = height.filter(|h| *h > 0);
    if width.is_none() && height.is_none() {
        return None;
    }
    Some(json!({
        "width": width.unwrap_or(DEFAULT_WIDTH),
        "height": height.unwrap_or(DEFAULT_HEIGHT),
    }))
}

// ─── Screenshot ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewportOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub device_scale_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputOptions {
    pub format: Option<String>,
    pub quality: Option<u32>,
    pub full_page: Option<bool>,
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitOptions {
    pub delay: Option<u64>,
    pub wait_for: Option<String>,
    pub wait_until: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageModifications {
    pub dark_mode: Option<bool>,
    pub custom_css: Option<String>,
    /// Comma-separated CSS selectors.
    pub hide_selectors: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockingOptions {
    pub block_ads: Option<bool>,
    pub block_cookie_banners: Option<bool>,
    pub block_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotOptions {
    pub url: String,
    pub device: Option<String>,
    pub full_page: Option<bool>,
    pub dark_mode: Option<bool>,
    pub block_cookie_banners: Option<bool>,
    pub viewport_options: ViewportOptions,
    pub output_options: OutputOptions,
    pub wait_options: WaitOptions,
    pub page_modifications: PageModifications,
    pub blocking_options: BlockingOptions,
}

impl ScreenshotOptions {
    /// Output format, `png` unless set.
    pub fn format(&self) -> &str {
        non_empty(&self.output_options.format).unwrap_or("png")
    }
}

pub fn screenshot_payload(opts: &ScreenshotOptions) -> Value {
    let mut p = Map::new();
    p.insert("url".into(), json!(opts.url));

    let vp = &opts.viewport_options;
    let mut viewport = Map::new();
    if let Some(w) = vp.width.filter(|w| *w > 0) {
        viewport.insert("width".into(), json!(w));
    }
    if let Some(h) = vp.height.filter(|h| *h > 0) {
        viewport.insert("height".into(), json!(h));
    }
    if let Some(d) = non_zero(vp.device_scale_factor) {
        viewport.insert("deviceScaleFactor".into(), json!(d));
    }
    if !viewport.is_empty() {
        p.insert("viewport".into(), Value::Object(viewport));
    }

    // A device preset overrides the viewport on the vendor side.
    if let Some(device) = non_empty(&opts.device) {
        p.insert("device".into(), json!(device));
    }

    let out = &opts.output_options;
    if let Some(format) = non_empty(&out.format) {
        p.insert("format".into(), json!(format));
    }
    if let Some(q) = out.quality {
        p.insert("quality".into(), json!(q));
    }
    if let Some(full) = out.full_page.or(opts.full_page) {
        p.insert("fullPage".into(), json!(full));
    }
    if let Some(sel) = non_empty(&out.selector) {
        p.insert("selector".into(), json!(sel));
    }

    let wait = &opts.wait_options;
    if let Some(d) = wait.delay {
        p.insert("delay".into(), json!(d));
    }
    if let Some(w) = non_empty(&wait.wait_for) {
        p.insert("waitFor".into(), json!(w));
    }
    if let Some(w) = non_empty(&wait.wait_until) {
        p.insert("waitUntil".into(), json!(w));
    }
    if let Some(t) = wait.timeout {
        p.insert("timeout".into(), json!(t));
    }

    let page = &opts.page_modifications;
    if let Some(dark) = page.dark_mode.or(opts.dark_mode) {
        p.insert("darkMode".into(), json!(dark));
    }
    if let Some(css) = non_empty(&page.custom_css) {
        p.insert("customCss".into(), json!(css));
    }
    if let Some(sel) = non_empty(&page.hide_selectors) {
        let selectors = split_commas(sel);
        if !selectors.is_empty() {
            p.insert("hideSelectors".into(), json!(selectors));
        }
    }

    let block = &opts.blocking_options;
    if let Some(ads) = block.block_ads {
        p.insert("blockAds".into(), json!(ads));
    }
    if let Some(banners) = block.block_cookie_banners.or(opts.block_cookie_banners) {
        p.insert("blockCookieBanners".into(), json!(banners));
    }
    if let Some(level) = non_empty(&block.block_level).filter(|l| *l != "none") {
        p.insert("blockLevel".into(), json!(level));
    }

    Value::Object(p)
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkScreenshotOptions {
    pub format: Option<String>,
    pub full_page: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u32>,
    pub block_ads: Option<bool>,
    pub block_cookie_banners: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookOptions {
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkOptions {
    /// One URL per line.
    pub urls: String,
    pub screenshot_options: BulkScreenshotOptions,
    pub webhook_options: WebhookOptions,
}

pub fn bulk_payload(opts: &BulkOptions) -> Value {
    let urls: Vec<Value> = split_lines(&opts.urls)
        .into_iter()
        .map(|url| json!({ "url": url }))
        .collect();

    let mut p = Map::new();
    p.insert("urls".into(), Value::Array(urls));

    let so = &opts.screenshot_options;
    let mut defaults = Map::new();
    if let Some(format) = non_empty(&so.format) {
        defaults.insert("format".into(), json!(format));
    }
    if let Some(full) = so.full_page {
        defaults.insert("fullPage".into(), json!(full));
    }
    if let Some(viewport) = sized_viewport(so.width, so.height) {
        defaults.insert("viewport".into(), viewport);
    }
    if let Some(q) = so.quality {
        defaults.insert("quality".into(), json!(q));
    }
    if let Some(ads) = so.block_ads {
        defaults.insert("blockAds".into(), json!(ads));
    }
    if let Some(banners) = so.block_cookie_banners {
        defaults.insert("blockCookieBanners".into(), json!(banners));
    }
    if !defaults.is_empty() {
        p.insert("defaults".into(), Value::Object(defaults));
    }

    if let Some(url) = non_empty(&opts.webhook_options.webhook_url) {
        p.insert("webhookUrl".into(), json!(url));
    }
    if let Some(secret) = non_empty(&opts.webhook_options.webhook_secret) {
        p.insert("webhookSecret".into(), json!(secret));
    }

    Value::Object(p)
}

// ─── Compose ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposeLayoutOptions {
    pub format: Option<String>,
    pub quality: Option<u32>,
    pub spacing: Option<u32>,
    pub padding: Option<u32>,
    pub background: Option<String>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposeScreenshotDefaults {
    pub full_page: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dark_mode: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposeOptions {
    pub urls: String,
    pub layout: String,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub compose_options: ComposeLayoutOptions,
    pub screenshot_defaults: ComposeScreenshotDefaults,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            urls: String::new(),
            layout: "grid".into(),
            is_async: true,
            compose_options: ComposeLayoutOptions::default(),
            screenshot_defaults: ComposeScreenshotDefaults::default(),
        }
    }
}

impl ComposeOptions {
    pub fn format(&self) -> &str {
        non_empty(&self.compose_options.format).unwrap_or("png")
    }
}

pub fn compose_payload(opts: &ComposeOptions) -> Value {
    let captures: Vec<Value> = split_lines(&opts.urls)
        .into_iter()
        .enumerate()
        .map(|(i, url)| json!({ "url": url, "id": format!("capture_{}", i + 1) }))
        .collect();

    let mut output = Map::new();
    if !opts.layout.is_empty() {
        output.insert("layout".into(), json!(opts.layout.to_uppercase()));
    }
    let co = &opts.compose_options;
    if let Some(v) = co.spacing {
        output.insert("spacing".into(), json!(v));
    }
    if let Some(v) = co.padding {
        output.insert("padding".into(), json!(v));
    }
    if let Some(v) = non_empty(&co.background) {
        output.insert("background".into(), json!(v));
    }
    if let Some(v) = non_empty(&co.format) {
        output.insert("format".into(), json!(v));
    }
    if let Some(v) = co.quality {
        output.insert("quality".into(), json!(v));
    }
    if let Some(v) = co.max_width {
        output.insert("maxWidth".into(), json!(v));
    }
    if let Some(v) = co.max_height {
        output.insert("maxHeight".into(), json!(v));
    }

    let mut p = Map::new();
    p.insert("captures".into(), Value::Array(captures));
    if !output.is_empty() {
        p.insert("output".into(), Value::Object(output));
    }

    let sd = &opts.screenshot_defaults;
    let mut defaults = Map::new();
    if let Some(full) = sd.full_page {
        defaults.insert("fullPage".into(), json!(full));
    }
    if let Some(viewport) = sized_viewport(sd.width, sd.height) {
        defaults.insert("viewport".into(), viewport);
    }
    if let Some(dark) = sd.dark_mode {
        defaults.insert("darkMode".into(), json!(dark));
    }
    if !defaults.is_empty() {
        p.insert("defaults".into(), Value::Object(defaults));
    }

    p.insert("async".into(), json!(opts.is_async));
    Value::Object(p)
}

// ─── Schedule ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleCaptureOptions {
    pub format: Option<String>,
    pub full_page: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dark_mode: Option<bool>,
    pub block_ads: Option<bool>,
    pub block_cookie_banners: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleOptions {
    pub name: String,
    pub url: String,
    /// Cron expression.
    pub cron: String,
    pub timezone: String,
    pub schedule_options: ScheduleCaptureOptions,
    pub webhook_url: Option<String>,
    pub retention_days: Option<u32>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            cron: String::new(),
            timezone: "UTC".into(),
            schedule_options: ScheduleCaptureOptions::default(),
            webhook_url: None,
            retention_days: Some(30),
        }
    }
}

pub fn schedule_payload(opts: &ScheduleOptions) -> Value {
    let mut p = Map::new();
    p.insert("name".into(), json!(opts.name));
    p.insert("url".into(), json!(opts.url));
    p.insert("schedule".into(), json!(opts.cron));
    if !opts.timezone.is_empty() {
        p.insert("timezone".into(), json!(opts.timezone));
    }

    let so = &opts.schedule_options;
    let mut options = Map::new();
    if let Some(format) = non_empty(&so.format) {
        options.insert("format".into(), json!(format));
    }
    if let Some(full) = so.full_page {
        options.insert("fullPage".into(), json!(full));
    }
    if let Some(viewport) = sized_viewport(so.width, so.height) {
        options.insert("viewport".into(), viewport);
    }
    if let Some(dark) = so.dark_mode {
        options.insert("darkMode".into(), json!(dark));
    }
    if let Some(ads) = so.block_ads {
        options.insert("blockAds".into(), json!(ads));
    }
    if let Some(banners) = so.block_cookie_banners {
        options.insert("blockCookieBanners".into(), json!(banners));
    }
    if !options.is_empty() {
        p.insert("options".into(), Value::Object(options));
    }

    if let Some(url) = non_empty(&opts.webhook_url) {
        p.insert("webhookUrl".into(), json!(url));
    }
    if let Some(days) = opts.retention_days {
        p.insert("retentionDays".into(), json!(days));
    }
    Value::Object(p)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub schedule: Option<String>,
    pub timezone: Option<String>,
    pub retention_days: Option<u32>,
}

pub fn schedule_update_payload(update: &ScheduleUpdate) -> Value {
    let mut p = Map::new();
    if let Some(v) = non_empty(&update.name) {
        p.insert("name".into(), json!(v));
    }
    if let Some(v) = non_empty(&update.url) {
        p.insert("url".into(), json!(v));
    }
    if let Some(v) = non_empty(&update.schedule) {
        p.insert("schedule".into(), json!(v));
    }
    if let Some(v) = non_empty(&update.timezone) {
        p.insert("timezone".into(), json!(v));
    }
    if let Some(days) = update.retention_days.filter(|d| *d > 0) {
        p.insert("retentionDays".into(), json!(days));
    }
    Value::Object(p)
}
