//! The fixed capability surface exposed to script fragments
//!
//! Everything a fragment may touch beyond plain computation is registered
//! here as a named function. Fragments never see the process environment, the
//! filesystem or raw sockets; they see `fetch`, `html_text`, `post_json` and
//! friends, and whatever those choose to allow.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map};
use scraper::{Html, Selector};
use url::Url;

use crate::sandbox::sanitize::sanitize;

/// Header sent with every capability HTTP request; some quiz servers refuse
/// obviously non-browser clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Register the capability functions on a fresh engine.
///
/// `http` is a blocking client; fragment execution always happens on a
/// blocking worker thread.
pub fn register(engine: &mut Engine, http: reqwest::blocking::Client) {
    let fetch_client = http.clone();
    engine.register_fn("fetch", move |url: &str| -> ScriptResult<String> {
        let response = fetch_client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("fetch failed for {url}: {e}"))?;
        response
            .text()
            .map_err(|e| format!("fetch failed reading body of {url}: {e}").into())
    });

    let json_client = http.clone();
    engine.register_fn("fetch_json", move |url: &str| -> ScriptResult<Dynamic> {
        let response = json_client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("fetch_json failed for {url}: {e}"))?;
        let value: serde_json::Value = response
            .json()
            .map_err(|e| format!("fetch_json failed parsing {url}: {e}"))?;
        rhai::serde::to_dynamic(&value)
    });

    let post_client = http.clone();
    engine.register_fn(
        "post_json",
        move |url: &str, payload: Map| -> ScriptResult<String> {
            let body = sanitize(&Dynamic::from(payload));
            let response = post_client
                .post(url)
                .json(&body)
                .send()
                .map_err(|e| format!("post_json failed for {url}: {e}"))?;
            response
                .text()
                .map_err(|e| format!("post_json failed reading reply of {url}: {e}").into())
        },
    );

    let pdf_client = http;
    engine.register_fn("fetch_pdf_text", move |url: &str| -> ScriptResult<String> {
        let bytes = pdf_client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("fetch_pdf_text failed for {url}: {e}"))?
            .bytes()
            .map_err(|e| format!("fetch_pdf_text failed reading {url}: {e}"))?;
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| format!("fetch_pdf_text failed extracting {url}: {e}").into())
    });

    engine.register_fn(
        "html_text",
        |html: &str, selector: &str| -> ScriptResult<Array> {
            let selector = parse_selector(selector)?;
            let document = Html::parse_document(html);
            Ok(document
                .select(&selector)
                .map(|el| {
                    Dynamic::from(el.text().collect::<String>().trim().to_string())
                })
                .collect())
        },
    );

    engine.register_fn(
        "html_attr",
        |html: &str, selector: &str, attr: &str| -> ScriptResult<Array> {
            let selector = parse_selector(selector)?;
            let document = Html::parse_document(html);
            Ok(document
                .select(&selector)
                .filter_map(|el| el.value().attr(attr))
                .map(|value| Dynamic::from(value.to_string()))
                .collect())
        },
    );

    engine.register_fn(
        "url_join",
        |base: &str, relative: &str| -> ScriptResult<String> {
            let base = Url::parse(base).map_err(|e| format!("url_join: bad base {base}: {e}"))?;
            let joined = base
                .join(relative)
                .map_err(|e| format!("url_join: cannot join {relative}: {e}"))?;
            Ok(joined.to_string())
        },
    );

    engine.register_fn("base64_encode", |data: &str| -> String {
        BASE64.encode(data.as_bytes())
    });

    engine.register_fn("base64_decode", |text: &str| -> ScriptResult<String> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| format!("base64_decode: {e}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    });

    engine.register_fn("parse_json", |text: &str| -> ScriptResult<Dynamic> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| format!("parse_json: {e}"))?;
        rhai::serde::to_dynamic(&value)
    });

    engine.register_fn("to_json", |value: Dynamic| -> String {
        sanitize(&value).to_string()
    });
}

fn parse_selector(selector: &str) -> Result<Selector, Box<EvalAltResult>> {
    Selector::parse(selector).map_err(|_| format!("invalid CSS selector: {selector}").into())
}
