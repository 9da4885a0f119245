use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::api::sse::SseDecoder;
use crate::api::traits::{EventStream, RentalApi};
use crate::api::types::OfferQuery;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::models::{
    Districts, GeoBounds, NearbyRequest, OfferDetailRequest, OfferDetailResponse, OfferList,
    OffersPage, PingRequest, PingResponse, StartScrapingResponse, StatsResponse, StatusResponse,
    StreamMessage,
};

const STREAM_PATH: &str = "api/stream";

/// `RentalApi` over HTTP
pub struct HttpApi {
    client: Client,
    base: Url,
    list_timeout: Duration,
}

impl HttpApi {
    /// Create a client for the backend at `config.base_url`
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let mut base =
            Url::parse(&config.base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // No client-wide timeout: only the list request is cut off.
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::Network {
                endpoint: base.to_string(),
                reason: e.to_string(),
                connect: false,
            })?;

        info!(base_url = %base, "Backend client ready");

        Ok(Self {
            client,
            base,
            list_timeout: config.list_timeout(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T, ApiError> {
        debug!(endpoint = path, "Sending request");

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ApiError::from_reqwest(path, e))?;

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::from_reqwest(path, e))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.client.get(self.url(path)?);
        self.send(path, request).await
    }

    async fn post_json<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)?);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(path, request).await
    }
}

#[async_trait]
impl RentalApi for HttpApi {
    async fn districts(&self) -> Result<Districts, ApiError> {
        self.get_json("api/districts").await
    }

    async fn settings(&self) -> Result<serde_json::Value, ApiError> {
        self.get_json("api/settings").await
    }

    async fn save_settings(&self, settings: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
        self.post_json("api/settings", Some(settings)).await
    }

    async fn status(&self) -> Result<StatusResponse, ApiError> {
        self.get_json("api/status").await
    }

    async fn offers(&self, query: &OfferQuery) -> Result<OffersPage, ApiError> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(4);
        if let Some(district) = &query.district {
            params.push(("district", district.clone()));
        }
        params.push(("page", query.page.to_string()));
        params.push(("limit", query.limit().to_string()));
        if let Some(sort) = &query.sort {
            params.push(("sort", sort.clone()));
        }

        let request = self
            .client
            .get(self.url("api/offers")?)
            .query(&params)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(self.list_timeout);
        self.send("api/offers", request).await
    }

    async fn offers_map(&self) -> Result<OfferList, ApiError> {
        let request = self
            .client
            .get(self.url("api/offers-map")?)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache");
        self.send("api/offers-map", request).await
    }

    async fn offers_nearby(&self, bounds: GeoBounds, limit: u32) -> Result<OfferList, ApiError> {
        let body = NearbyRequest { bounds, limit };
        self.post_json("api/offers-nearby", Some(&body)).await
    }

    async fn ping_visible(&self, links: &[String]) -> Result<PingResponse, ApiError> {
        let body = PingRequest {
            links: links.to_vec(),
        };
        self.post_json("api/ping-visible", Some(&body)).await
    }

    async fn start_scraping(&self) -> Result<StartScrapingResponse, ApiError> {
        self.post_json::<(), _>("api/start-scraping", None).await
    }

    async fn offer_detail(&self, link: &str, scraper: &str) -> Result<OfferDetailResponse, ApiError> {
        let body = OfferDetailRequest {
            link: link.to_string(),
            scraper: scraper.to_string(),
        };
        self.post_json("api/offer-detail", Some(&body)).await
    }

    async fn stats(&self) -> Result<StatsResponse, ApiError> {
        self.get_json("api/stats").await
    }

    async fn clear_cache(&self) -> Result<serde_json::Value, ApiError> {
        self.post_json::<(), _>("api/clear-cache", None).await
    }

    async fn cleanup_cache(&self) -> Result<serde_json::Value, ApiError> {
        self.post_json::<(), _>("api/cleanup-cache", None).await
    }

    async fn cache_stats(&self) -> Result<serde_json::Value, ApiError> {
        self.get_json("api/cache-stats").await
    }

    async fn stream(&self) -> Result<EventStream, ApiError> {
        let response = self
            .client
            .get(self.url(STREAM_PATH)?)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ApiError::from_reqwest(STREAM_PATH, e))?;

        info!("Live update stream connected");

        let state = (
            Box::pin(response.bytes_stream()),
            SseDecoder::default(),
            VecDeque::<String>::new(),
        );
        let frames = futures_util::stream::unfold(state, |(mut bytes, mut decoder, mut pending)| async move {
            loop {
                if let Some(data) = pending.pop_front() {
                    let frame = serde_json::from_str::<StreamMessage>(&data).map_err(|e| {
                        ApiError::Decode {
                            endpoint: STREAM_PATH.to_string(),
                            reason: e.to_string(),
                        }
                    });
                    return Some((frame, (bytes, decoder, pending)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        return Some((
                            Err(ApiError::from_reqwest(STREAM_PATH, e)),
                            (bytes, decoder, pending),
                        ))
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(frames))
    }
}
