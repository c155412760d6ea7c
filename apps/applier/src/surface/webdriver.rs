//! W3C WebDriver client (chromedriver) implementing `AutomationSurface`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::behavior::{Bounds, Point, Viewport};
use crate::surface::{AutomationSurface, ElementHandle, Locator, Selector, SurfaceError};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const BROWSER_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-features=IsolateOrigins,site-per-process",
    "--start-maximized",
    "--lang=uk-UA",
];

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
];

/// Injected before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['uk-UA', 'uk', 'en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub user_agent: String,
}

impl BrowserOptions {
    /// Picks one of `USER_AGENTS` at random.
    pub fn with_random_agent(headless: bool) -> Self {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();
        Self {
            headless,
            user_agent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// A cookie as exported by a browser extension or a Playwright context.
#[derive(Debug, Deserialize)]
struct ExportedCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default, rename = "httpOnly")]
    http_only: bool,
    #[serde(default, alias = "expirationDate")]
    expires: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<ExportedCookie>),
    StorageState { cookies: Vec<ExportedCookie> },
}

impl CookieFile {
    fn into_cookies(self) -> Vec<ExportedCookie> {
        match self {
            CookieFile::List(c) | CookieFile::StorageState { cookies: c } => c,
        }
    }
}

fn cookie_to_wire(cookie: &ExportedCookie) -> Value {
    let mut wire = json!({
        "name": cookie.name,
        "value": cookie.value,
        "path": cookie.path.as_deref().unwrap_or("/"),
        "secure": cookie.secure,
        "httpOnly": cookie.http_only,
    });
    if let Some(domain) = &cookie.domain {
        wire["domain"] = json!(domain);
    }
    // Negative means "session cookie" in Playwright exports.
    if let Some(expires) = cookie.expires.filter(|e| *e > 0.0) {
        wire["expiry"] = json!(expires as u64);
    }
    wire
}

fn element_ref(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

fn parse_element(value: &Value) -> Option<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
}

pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: String,
}

impl WebDriverSession {
    /// Opens a new browser session on the driver at `webdriver_url`.
    pub async fn start(webdriver_url: &str, options: &BrowserOptions) -> Result<Self, SurfaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;

        let mut args: Vec<String> = BROWSER_ARGS.iter().map(|a| a.to_string()).collect();
        args.push(format!("--user-agent={}", options.user_agent));
        if options.headless {
            args.push("--headless=new".to_string());
            args.push("--window-size=1920,1080".to_string());
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false,
                    }
                }
            }
        });

        let base = webdriver_url.trim_end_matches('/').to_string();
        let response = client
            .post(format!("{base}/session"))
            .json(&capabilities)
            .send()
            .await?;
        let value = unwrap_response(response).await?;
        let created: NewSession = serde_json::from_value(value)
            .map_err(|e| SurfaceError::Protocol(format!("new session: {e}")))?;

        info!("WebDriver session {} started", created.session_id);

        let session = Self {
            client,
            base,
            session_id: created.session_id,
        };
        session.install_stealth_script().await;
        Ok(session)
    }

    async fn install_stealth_script(&self) {
        let body = json!({
            "cmd": "Page.addScriptToEvaluateOnNewDocument",
            "params": { "source": STEALTH_SCRIPT },
        });
        if let Err(e) = self.command(Method::POST, "goog/cdp/execute", Some(body)).await {
            warn!("Could not install init script (non-Chrome driver?): {e}");
        }
    }

    /// Navigates to `base_url` (cookies are per domain) and adds every cookie
    /// from the exported file. Returns how many were accepted.
    pub async fn load_cookies(&mut self, base_url: &str, path: &Path) -> Result<usize, SurfaceError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let cookies = serde_json::from_str::<CookieFile>(&raw)
            .map_err(|e| SurfaceError::Protocol(format!("cookie file {}: {e}", path.display())))?
            .into_cookies();

        self.navigate(base_url).await?;

        let mut added = 0;
        for cookie in &cookies {
            let body = json!({ "cookie": cookie_to_wire(cookie) });
            match self.command(Method::POST, "cookie", Some(body)).await {
                Ok(_) => added += 1,
                Err(e) => warn!("Skipping cookie {}: {e}", cookie.name),
            }
        }
        info!("Loaded {added}/{} session cookies", cookies.len());
        Ok(added)
    }

    /// Deletes the session; the driver closes the browser.
    pub async fn quit(self) -> Result<(), SurfaceError> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        let response = self.client.delete(url).send().await?;
        unwrap_response(response).await?;
        info!("WebDriver session closed");
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SurfaceError> {
        let url = format!("{}/session/{}/{}", self.base, self.session_id, path);
        let mut request = self.client.request(method, url);
        // POST commands need a JSON body, even an empty one.
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        unwrap_response(response).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, SurfaceError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

/// Extracts `value` from a WebDriver response, mapping error payloads.
async fn unwrap_response(response: reqwest::Response) -> Result<Value, SurfaceError> {
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let wire: WireError = serde_json::from_value(value)
        .map_err(|_| SurfaceError::Protocol(format!("status {status} without error body")))?;
    if wire.error == "stale element reference" {
        return Err(SurfaceError::StaleElement);
    }
    Err(SurfaceError::Driver {
        error: wire.error,
        message: wire.message.lines().next().unwrap_or_default().to_string(),
    })
}

fn using(selector: &Selector) -> &'static str {
    match selector.strategy {
        Locator::Css => "css selector",
        Locator::XPath => "xpath",
    }
}

#[async_trait]
impl AutomationSurface for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        debug!("navigate {url}");
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                SurfaceError::Driver { message, .. } => SurfaceError::Navigation {
                    url: url.to_string(),
                    reason: message,
                },
                other => other,
            })
    }

    async fn current_url(&mut self) -> Result<String, SurfaceError> {
        let value = self.command(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SurfaceError::Protocol("url is not a string".into()))
    }

    async fn locate(&mut self, selector: &Selector) -> Result<Option<ElementHandle>, SurfaceError> {
        Ok(self.locate_all(selector).await?.into_iter().next())
    }

    async fn locate_all(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, SurfaceError> {
        let body = json!({ "using": using(selector), "value": selector.value });
        let value = self.command(Method::POST, "elements", Some(body)).await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(parse_element).collect())
            .unwrap_or_default())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SurfaceError> {
        let path = format!("element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn move_pointer_through(
        &mut self,
        points: &[Point],
        step: Duration,
    ) -> Result<(), SurfaceError> {
        if points.is_empty() {
            return Ok(());
        }
        let moves: Vec<Value> = points
            .iter()
            .map(|p| {
                json!({
                    "type": "pointerMove",
                    "duration": step.as_millis() as u64,
                    "origin": "viewport",
                    "x": p.x.round().max(0.0) as i64,
                    "y": p.y.round().max(0.0) as i64,
                })
            })
            .collect();
        let body = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": moves,
            }]
        });
        self.command(Method::POST, "actions", Some(body)).await?;
        Ok(())
    }

    async fn scroll_by(&mut self, delta: i64) -> Result<(), SurfaceError> {
        self.execute("window.scrollBy(0, arguments[0]);", vec![json!(delta)])
            .await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), SurfaceError> {
        self.execute(
            "arguments[0].scrollIntoView({block: 'center', behavior: 'smooth'});",
            vec![element_ref(element)],
        )
        .await?;
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, SurfaceError> {
        // textContent, unlike the text endpoint, includes collapsed sections.
        let value = self
            .execute("return arguments[0].textContent;", vec![element_ref(element)])
            .await?;
        Ok(value.as_str().unwrap_or_default().trim().to_string())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let value = self
            .execute(
                "return arguments[0].getAttribute(arguments[1]);",
                vec![element_ref(element), json!(name)],
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn element_bounds(
        &mut self,
        element: &ElementHandle,
    ) -> Result<Option<Bounds>, SurfaceError> {
        let value = self
            .execute(
                "const r = arguments[0].getBoundingClientRect(); \
                 return {x: r.left, y: r.top, width: r.width, height: r.height};",
                vec![element_ref(element)],
            )
            .await?;
        let bounds: Bounds = serde_json::from_value(value)
            .map_err(|e| SurfaceError::Protocol(format!("bounds: {e}")))?;
        Ok((bounds.width > 0.0 && bounds.height > 0.0).then_some(bounds))
    }

    async fn scrollable_height(&mut self) -> Result<u32, SurfaceError> {
        let value = self
            .execute(
                "return Math.max(0, document.documentElement.scrollHeight - window.innerHeight - window.scrollY);",
                vec![],
            )
            .await?;
        Ok(value.as_f64().unwrap_or(0.0).max(0.0) as u32)
    }

    async fn viewport(&mut self) -> Result<Viewport, SurfaceError> {
        let value = self
            .execute(
                "return {width: window.innerWidth, height: window.innerHeight};",
                vec![],
            )
            .await?;
        serde_json::from_value(value).map_err(|e| SurfaceError::Protocol(format!("viewport: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_element_reference() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        assert_eq!(parse_element(&value), Some(ElementHandle("abc-123".into())));
        assert_eq!(parse_element(&json!({"other": 1})), None);
    }

    #[test]
    fn test_cookie_file_accepts_plain_list_and_storage_state() {
        let list = r#"[{"name":"sid","value":"1","domain":".work.ua","expirationDate":1893456000.5}]"#;
        let state = r#"{"cookies":[{"name":"sid","value":"1","domain":".work.ua","expires":-1,"httpOnly":true}]}"#;

        let from_list = serde_json::from_str::<CookieFile>(list).unwrap().into_cookies();
        assert_eq!(from_list.len(), 1);
        let wire = cookie_to_wire(&from_list[0]);
        assert_eq!(wire["expiry"], json!(1893456000u64));
        assert_eq!(wire["path"], json!("/"));

        let from_state = serde_json::from_str::<CookieFile>(state).unwrap().into_cookies();
        let wire = cookie_to_wire(&from_state[0]);
        assert!(wire.get("expiry").is_none(), "session cookie must not get an expiry");
        assert_eq!(wire["httpOnly"], json!(true));
    }

    #[test]
    fn test_random_agent_is_from_the_list() {
        let options = BrowserOptions::with_random_agent(true);
        assert!(USER_AGENTS.contains(&options.user_agent.as_str()));
    }

    #[test]
    fn test_locator_strategy_names() {
        assert_eq!(using(&Selector::css("main")), "css selector");
        assert_eq!(using(&Selector::xpath("//a")), "xpath");
    }
}
