//! HTTP scrape endpoint: `GET /metrics` renders the registry on every
//! request, no caching beyond the registry's own latest-value state.

use crate::metrics::MetricRegistry;
use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::info;
use std::sync::Arc;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub struct ApiManager {
    registry: Arc<MetricRegistry>,
    port: u16,
}

impl ApiManager {
    pub fn new(registry: Arc<MetricRegistry>, port: u16) -> Self {
        ApiManager { registry, port }
    }

    /// Bind the listener and hand back the server future. Binding failures
    /// (port in use) surface here, before the caller spawns anything.
    pub fn start(self) -> std::io::Result<Server> {
        let registry = web::Data::new(self.registry);
        let server = HttpServer::new(move || {
            App::new()
                .app_data(registry.clone())
                .route("/metrics", web::get().to(metrics))
        })
        .bind(("0.0.0.0", self.port))?
        .run();

        info!("Prometheus endpoint listening on port {}", self.port);
        Ok(server)
    }
}

async fn metrics(registry: web::Data<Arc<MetricRegistry>>) -> impl Responder {
    HttpResponse::Ok()
        .content_type(EXPOSITION_CONTENT_TYPE)
        .body(registry.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsmr::structs::{DecodedRecord, FieldValue};
    use actix_web::test;

    #[actix_rt::test]
    async fn test_metrics_endpoint_serves_live_registry() {
        let registry = Arc::new(MetricRegistry::new());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry.clone()))
                .route("/metrics", web::get().to(metrics)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request())
            .await;
        assert!(resp.status().is_success());
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("current_elec_usage 0\n"));

        // A registry update between scrapes shows up on the next scrape.
        let mut record = DecodedRecord::new();
        record.fields.insert(
            "CURRENT_ELECTRICITY_USAGE",
            FieldValue::Numeric {
                value: 0.244,
                unit: Some("kW".to_string()),
            },
        );
        registry.apply(&record);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request())
            .await;
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("current_elec_usage 0.244\n"));
    }
}
