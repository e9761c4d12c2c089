//! Shared fixtures for the orchestration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use uuid::Uuid;
use wiremock::{MockServer, ResponseTemplate};

use registerscout_crawler::Fetcher;
use registerscout_discovery::{SearchResult, WebSearcher};
use registerscout_shared::{
    AttributionConfig, CrawlConfig, FetchConfig, Official, Result, ScoutError,
};
use registerscout_storage::Storage;

use crate::orchestrator::Attributor;

const DEMOCRACY_HOST: &str = "democracy.sandshire.gov.uk";
const WWW_HOST: &str = "www.sandshire.gov.uk";

pub(crate) fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

/// A single-page PDF whose text is `text`.
pub(crate) fn pdf_page(text: &str) -> ResponseTemplate {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    ResponseTemplate::new(200).set_body_raw(bytes, "application/pdf")
}

/// Counts queries and answers every one with the same URLs. Can be told to
/// fail every query or to panic on some.
#[derive(Default)]
pub(crate) struct CountingSearcher {
    pub calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    failing: AtomicBool,
    panic_on: Mutex<Option<String>>,
}

impl CountingSearcher {
    pub fn respond_with(&self, urls: Vec<String>) {
        *self.urls.lock().unwrap() = urls;
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Panic on any query containing `needle`.
    pub fn panic_when_query_contains(&self, needle: &str) {
        *self.panic_on.lock().unwrap() = Some(needle.to_string());
    }
}

#[async_trait]
impl WebSearcher for CountingSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let trigger = self.panic_on.lock().unwrap().clone();
        if trigger.is_some_and(|needle| query.contains(&needle)) {
            panic!("searcher crashed on {query:?}");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScoutError::Search(format!("provider unavailable for {query:?}")));
        }
        let urls = self.urls.lock().unwrap().clone();
        Ok(urls
            .into_iter()
            .take(max_results)
            .map(|url| SearchResult {
                url,
                title: "Councillor page".into(),
                snippet: String::new(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// A fresh database plus an attributor whose council hosts resolve to the
/// mock server.
pub(crate) struct Harness {
    pub storage: Arc<Storage>,
    pub searcher: Arc<CountingSearcher>,
    pub attributor: Attributor,
    addr: SocketAddr,
}

impl Harness {
    pub async fn new(server: &MockServer) -> Self {
        let addr = *server.address();
        let tmp = std::env::temp_dir().join(format!("rs_core_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let searcher = Arc::new(CountingSearcher::default());

        Self {
            attributor: build_attributor(addr, Arc::clone(&storage), Arc::clone(&searcher)),
            storage,
            searcher,
            addr,
        }
    }

    /// A new attributor (fresh caches and ledger) over the same database.
    pub fn fresh_attributor(&self) -> Attributor {
        build_attributor(self.addr, Arc::clone(&self.storage), Arc::clone(&self.searcher))
    }

    pub fn democracy_base(&self) -> String {
        format!("http://{DEMOCRACY_HOST}:{}", self.addr.port())
    }

    pub fn www_base(&self) -> String {
        format!("http://{WWW_HOST}:{}", self.addr.port())
    }

    pub async fn official(&self, name: &str, council: &str, ward: Option<&str>) -> Official {
        let id = self
            .storage
            .insert_official(name, council, ward)
            .await
            .expect("insert official");
        Official {
            id,
            name: name.to_string(),
            council: council.to_string(),
            ward: ward.map(str::to_string),
        }
    }
}

fn build_attributor(
    addr: SocketAddr,
    storage: Arc<Storage>,
    searcher: Arc<CountingSearcher>,
) -> Attributor {
    let fetch = FetchConfig {
        host_overrides: vec![(DEMOCRACY_HOST.into(), addr), (WWW_HOST.into(), addr)],
        ..FetchConfig::default()
    };
    let fetcher = Fetcher::new(&fetch).expect("build fetcher");

    let crawl = CrawlConfig {
        max_pages: 10,
        max_depth: 2,
        ..CrawlConfig::default()
    };
    let config = AttributionConfig {
        index_url_templates: vec![format!(
            "http://democracy.{{slug}}.gov.uk:{}/mgMemberIndex.aspx?bcr=1",
            addr.port()
        )],
        ..AttributionConfig::default()
    };

    Attributor::new(storage, fetcher, crawl, searcher, config)
}
