//! Scripted in-memory browser for exercising the portal state machine.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use super::browser::{Browser, BrowserError};

pub const LOGIN_URL: &str = "https://portal.example/login";
pub const HOME_URL: &str = "https://portal.example/home";

#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub url: Option<String>,
    pub show: Vec<String>,
    pub hide: Vec<String>,
    pub page: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    url: String,
    visible: HashSet<String>,
    never: HashSet<String>,
    subtrees: HashMap<String, String>,
    transitions: HashMap<String, Transition>,
    clicks: Vec<(String, usize)>,
    filled: Vec<(String, String)>,
    busy: bool,
    screenshots: Vec<PathBuf>,
}

impl Inner {
    fn present(&self, selector: &str) -> bool {
        self.visible.contains(selector) && !self.never.contains(selector)
    }

    fn apply(&mut self, key: &str) -> bool {
        let Some(t) = self.transitions.get(key).cloned() else {
            return false;
        };
        if let Some(url) = t.url {
            self.url = url;
        }
        for s in t.hide {
            self.visible.remove(&s);
        }
        self.visible.extend(t.show);
        if let Some(page) = t.page {
            self.subtrees.insert("body".to_string(), page);
        }
        true
    }
}

/// Every wait resolves immediately; elements are "present" by selector and
/// only present elements can be clicked or filled.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBrowser {
    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    pub fn on(&self, key: &str, t: Transition) {
        self.with(|i| i.transitions.insert(key.to_string(), t));
    }

    pub fn on_click_stay(&self, selector: &str) {
        self.on(selector, Transition::default());
    }

    pub fn on_click_page(&self, selector: &str, page: &str) {
        self.on(
            selector,
            Transition {
                page: Some(page.to_string()),
                ..Transition::default()
            },
        );
    }

    pub fn never_show(&self, selector: &str) {
        self.with(|i| i.never.insert(selector.to_string()));
    }

    pub fn set_subtree(&self, selector: &str, html: &str) {
        self.with(|i| i.subtrees.insert(selector.to_string(), html.to_string()));
    }

    pub fn set_busy(&self, busy: bool) {
        self.with(|i| i.busy = busy);
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.with(|i| i.clicks.clone())
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.with(|i| i.filled.clone())
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.with(|i| i.screenshots.clone())
    }
}

#[async_trait::async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.with(|i| {
            i.url = url.to_string();
            i.apply(&format!("goto {url}"));
        });
        Ok(())
    }

    async fn wait_for_element(&self, selector: &str, _timeout: Duration) -> Result<bool, BrowserError> {
        Ok(self.with(|i| i.present(selector)))
    }

    async fn read_subtree(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.with(|i| {
            if i.present(selector) {
                i.subtrees.get(selector).cloned()
            } else {
                None
            }
        }))
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<(), BrowserError> {
        self.with(|i| {
            if !i.present(selector) {
                return Err(BrowserError::NoSuchElement(selector.to_string()));
            }
            i.clicks.push((selector.to_string(), index));
            i.apply(selector);
            Ok(())
        })
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.with(|i| {
            if !i.present(selector) {
                return Err(BrowserError::NoSuchElement(selector.to_string()));
            }
            i.filled.push((selector.to_string(), value.to_string()));
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.with(|i| i.url.clone()))
    }

    async fn wait_for_idle(&self, _timeout: Duration) -> Result<bool, BrowserError> {
        Ok(self.with(|i| !i.busy))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.with(|i| i.screenshots.push(path.to_path_buf()));
        Ok(())
    }
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The portal walk-through used by the state machine and pipeline tests,
/// wired to the default selectors: January holds 1.500,00 kWh, February is
/// empty and the January detail shows one day of 24 x 1,00 kWh.
pub fn portal_fixture() -> FakeBrowser {
    let browser = FakeBrowser::default();
    let login_form = r#"<form id="loginForm"><input name="username"><input name="password"><button type="submit">Accedi</button></form>"#;

    browser.on(
        &format!("goto {LOGIN_URL}"),
        Transition {
            show: strs(&[
                "body",
                "form#loginForm",
                "input[name='username']",
                "input[name='password']",
                "form#loginForm button[type='submit']",
            ]),
            page: Some(format!("<body>{login_form}</body>")),
            ..Transition::default()
        },
    );
    browser.on(
        "form#loginForm button[type='submit']",
        Transition {
            url: Some(HOME_URL.to_string()),
            show: strs(&["a#menu-consumi"]),
            hide: strs(&["form#loginForm", "input[name='username']", "input[name='password']"]),
            page: Some("<body><main>Benvenuto</main></body>".to_string()),
        },
    );
    browser.on(
        "a#menu-consumi",
        Transition {
            url: Some(format!("{HOME_URL}/consumi")),
            show: strs(&["#elencoForniture", "#dettaglioFornitura", "#btnCurvaCarico"]),
            ..Transition::default()
        },
    );
    browser.on(
        "#btnCurvaCarico",
        Transition {
            show: strs(&["#tabellaConsumiMensili", "#tabellaConsumiMensili td a"]),
            ..Transition::default()
        },
    );
    browser.set_subtree(
        "#tabellaConsumiMensili",
        r##"<table id="tabellaConsumiMensili">
             <tr><th>Gennaio</th><th>Febbraio</th></tr>
             <tr><td><a href="#">1.500,00</a></td><td></td></tr>
           </table>"##,
    );

    let hours: String = (0..24).map(|_| "<td>1,00</td>").collect();
    browser.on_click_page(
        "#tabellaConsumiMensili td a",
        &format!(r#"<body><table id="tabellaConsumiOrari"><tr><td>01/01/2025</td>{hours}</tr></table></body>"#),
    );

    browser
}
