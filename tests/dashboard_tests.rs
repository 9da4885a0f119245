use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rental_scout::api::{HttpApi, RentalApi};
use rental_scout::config::{Config, ServerConfig};
use rental_scout::error::ApiError;
use rental_scout::events::{DashboardEvent, LoadOptions};
use rental_scout::map::{MapView, MarkerGroup, Popup};
use rental_scout::models::GeoBounds;
use rental_scout::notify::{Notification, NotificationSink};
use rental_scout::ui::{Dashboard, EmptyState, FilterTag, OfferCard, OfferModal, Renderer};

/// One request seen by the stub backend.
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    target: String,
    body: String,
}

/// Minimal HTTP/1.1 backend answering canned bodies per path.
struct StubBackend {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl StubBackend {
    async fn start(routes: Vec<(&'static str, &'static str, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let routes: Arc<HashMap<&'static str, (&'static str, String)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, content_type, body)| (path, (content_type, body)))
                .collect(),
        );

        let recorded = seen.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, routes.clone(), recorded.clone()));
            }
        });

        Self { addr, seen }
    }

    fn api(&self) -> HttpApi {
        HttpApi::new(&ServerConfig {
            base_url: format!("http://{}", self.addr),
            ..ServerConfig::default()
        })
        .unwrap()
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<HashMap<&'static str, (&'static str, String)>>,
    seen: Arc<Mutex<Vec<Seen>>>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let Ok(read) = socket.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break end + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }
    let body = String::from_utf8_lossy(&buffer[header_end..]).to_string();

    let path = target.split('?').next().unwrap_or_default().to_string();
    seen.lock().push(Seen {
        method,
        target,
        body,
    });

    let response = match routes.get(path.as_str()) {
        Some((content_type, body)) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ),
        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    };
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn json_route(path: &'static str, body: serde_json::Value) -> (&'static str, &'static str, String) {
    (path, "application/json", body.to_string())
}

#[derive(Default)]
struct Recorder {
    lists: Mutex<Vec<Vec<OfferCard>>>,
    empties: Mutex<Vec<EmptyState>>,
    counts: Mutex<Vec<String>>,
    markers: Mutex<Vec<usize>>,
    notifications: Mutex<Vec<String>>,
}

impl Renderer for Recorder {
    fn render_list(&self, cards: &[OfferCard]) {
        self.lists.lock().push(cards.to_vec());
    }

    fn append_cards(&self, cards: &[OfferCard]) {
        self.lists.lock().push(cards.to_vec());
    }

    fn render_empty(&self, state: &EmptyState) {
        self.empties.lock().push(state.clone());
    }

    fn render_error(&self, _message: &str, _recoverable: bool) {}

    fn set_loading(&self, _loading: bool) {}

    fn set_active_count(&self, text: &str) {
        self.counts.lock().push(text.to_string());
    }

    fn set_active_filters(&self, _tags: &[FilterTag]) {}

    fn set_panel_title(&self, _title: &str) {}

    fn render_map(&self, markers: &[MarkerGroup], _view: &MapView) {
        self.markers.lock().push(markers.len());
    }

    fn show_popup(&self, _popup: &Popup) {}

    fn show_modal(&self, _modal: &OfferModal) {}

    fn set_processing_indicator(&self, _text: Option<&str>) {}

    fn set_scraper_options(&self, _scrapers: &[String]) {}
}

impl NotificationSink for Recorder {
    fn show(&self, notification: &Notification) {
        self.notifications.lock().push(notification.message.clone());
    }
}

fn dashboard(backend: &StubBackend) -> (Dashboard, Arc<Recorder>, tokio::sync::mpsc::UnboundedReceiver<DashboardEvent>) {
    let recorder = Arc::new(Recorder::default());
    let api: Arc<dyn RentalApi> = Arc::new(backend.api());
    let (dashboard, rx) = Dashboard::new(api, recorder.clone(), recorder.clone(), Config::default());
    (dashboard, recorder, rx)
}

#[tokio::test]
async fn test_backend_offer_renders_one_card() {
    let backend = StubBackend::start(vec![json_route(
        "/api/offers",
        json!({"offers": [{"link": "x", "price": "12 000 Kč"}], "pagination": {"total_count": 1}}),
    )])
    .await;
    let (dashboard, recorder, _rx) = dashboard(&backend);

    dashboard.load_offers(None, LoadOptions::quiet()).await;

    let lists = recorder.lists.lock();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].len(), 1);
    assert_eq!(lists[0][0].price, "12 000 Kč/měsíc");
    assert_eq!(recorder.counts.lock().last().map(String::as_str), Some("1"));

    let seen = backend.seen();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].target, "/api/offers?page=1&limit=500");
    dashboard.shutdown();
}

#[tokio::test]
async fn test_district_and_sort_reach_the_query() {
    let backend = StubBackend::start(vec![json_route(
        "/api/offers",
        json!({"offers": [], "expanded_districts": ["Praha 6"]}),
    )])
    .await;
    let (dashboard, recorder, _rx) = dashboard(&backend);
    let mut criteria = dashboard.criteria();
    criteria.sort = rental_scout::filter::SortOrder::PriceAsc;
    dashboard.store().lock().set_criteria(criteria);

    dashboard
        .load_offers(
            Some("Praha 5".to_string()),
            LoadOptions {
                no_scrape: true,
                ..LoadOptions::default()
            },
        )
        .await;

    let target = &backend.seen()[0].target;
    assert!(target.starts_with("/api/offers?district=Praha+5&page=1&limit=500"), "{target}");
    assert!(target.ends_with("sort=price-asc"), "{target}");
    assert_eq!(recorder.empties.lock()[0].title, "Žádné nabídky v Praha 5");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        recorder.notifications.lock().first().map(String::as_str),
        Some("Vyhledávání rozšířeno do okolních částí: Praha 6")
    );
    dashboard.shutdown();
}

#[tokio::test]
async fn test_dead_offer_is_removed_after_ping() {
    let backend = StubBackend::start(vec![
        json_route(
            "/api/offers",
            json!({"offers": [
                {"link": "gone", "price": 15000, "title": "Byt 1+kk"},
                {"link": "alive", "price": 16000, "title": "Byt 2+kk"}
            ]}),
        ),
        json_route(
            "/api/ping-visible",
            json!({"success": true, "invalid_count": 1, "results": [
                {"link": "gone", "is_valid": false, "ping_time": null},
                {"link": "alive", "is_valid": true, "ping_time": "2025-03-01T12:00:00"}
            ]}),
        ),
    ])
    .await;
    let (dashboard, recorder, mut rx) = dashboard(&backend);

    dashboard
        .load_offers(
            None,
            LoadOptions {
                no_scrape: true,
                ..LoadOptions::default()
            },
        )
        .await;
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, DashboardEvent::PingCompleted { .. }));
    dashboard.handle_event(event).await;

    let lists = recorder.lists.lock();
    let last = lists.last().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].link, "alive");

    let ping = backend
        .seen()
        .into_iter()
        .find(|seen| seen.target == "/api/ping-visible")
        .unwrap();
    assert_eq!(ping.method, "POST");
    let body: serde_json::Value = serde_json::from_str(&ping.body).unwrap();
    assert_eq!(body, json!({"links": ["gone", "alive"]}));
    dashboard.shutdown();
}

#[tokio::test]
async fn test_nearby_request_body() {
    let backend = StubBackend::start(vec![json_route("/api/offers-nearby", json!({"offers": []}))]).await;
    let api = backend.api();
    let bounds = GeoBounds {
        north: 50.1,
        south: 50.0,
        east: 14.5,
        west: 14.4,
    };

    let list = api.offers_nearby(bounds, 100).await.unwrap();

    assert!(list.offers.is_empty());
    let body: serde_json::Value = serde_json::from_str(&backend.seen()[0].body).unwrap();
    assert_eq!(body["limit"], 100);
    assert_eq!(body["bounds"]["north"], 50.1);
}

#[tokio::test]
async fn test_stream_frames_are_decoded() {
    let frames = concat!(
        "data: {\"type\": \"connected\", \"message\": \"ok\"}\n\n",
        ": keepalive\n\n",
        "data: not json\n\n",
        "data: {\"type\": \"scraping_complete\", \"message\": \"hotovo\", \"data\": {\"total\": 7}}\n\n",
    );
    let backend = StubBackend::start(vec![("/api/stream", "text/event-stream", frames.to_string())]).await;
    let api = backend.api();

    let results: Vec<_> = api.stream().await.unwrap().collect().await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().kind, "connected");
    assert!(matches!(results[1], Err(ApiError::Decode { .. })));
    let complete = results[2].as_ref().unwrap();
    assert_eq!(complete.kind, "scraping_complete");
    assert_eq!(complete.data["total"], 7);
}

#[tokio::test]
async fn test_error_kinds() {
    let backend = StubBackend::start(Vec::new()).await;
    let err = backend.api().stats().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }), "{err}");

    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let offline = HttpApi::new(&ServerConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        ..ServerConfig::default()
    })
    .unwrap();
    let err = offline.status().await.unwrap_err();
    assert!(err.is_unreachable(), "{err}");
}
