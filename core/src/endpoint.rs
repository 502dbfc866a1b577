//! Typed descriptions of REST operations.

use std::sync::Arc;

use crate::config::{keys, ConfigError, Configuration};
use crate::http::{HttpMethod, Parameters};
use crate::pipeline::{RequestGenerator, StandardRequestGenerator};

/// A logical REST operation, usually implemented by an enum with one variant
/// per operation. Turn it into a request with `Request::from_endpoint`.
pub trait ServiceEndpoint {
    fn base_url(&self) -> String;

    /// Path appended to the base URL. Empty by default.
    fn path(&self) -> String {
        String::new()
    }

    fn method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    fn parameters(&self) -> Option<Parameters> {
        None
    }

    fn query_parameters(&self) -> Option<Parameters> {
        None
    }

    fn request_generator(&self) -> Arc<dyn RequestGenerator> {
        Arc::new(StandardRequestGenerator)
    }
}

/// The configured `baseURL`, for endpoints that take it from configuration.
pub fn base_url_from(config: &dyn Configuration) -> Result<String, ConfigError> {
    config.require(keys::BASE_URL)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::StaticConfiguration;
    use crate::http::{headers, Request};
    use crate::pipeline::RequestPipeline;

    enum TodoApi {
        List { page: u32 },
        Create { title: String },
        Remove { id: u64 },
    }

    impl ServiceEndpoint for TodoApi {
        fn base_url(&self) -> String {
            "https://api.example.com/".to_string()
        }

        fn path(&self) -> String {
            match self {
                TodoApi::List { .. } | TodoApi::Create { .. } => "todos".to_string(),
                TodoApi::Remove { id } => format!("todos/{id}"),
            }
        }

        fn method(&self) -> HttpMethod {
            match self {
                TodoApi::List { .. } => HttpMethod::Get,
                TodoApi::Create { .. } => HttpMethod::Post,
                TodoApi::Remove { .. } => HttpMethod::Delete,
            }
        }

        fn parameters(&self) -> Option<Parameters> {
            match self {
                TodoApi::Create { title } => Some(json!({"title": title, "completed": false}).into()),
                _ => None,
            }
        }

        fn query_parameters(&self) -> Option<Parameters> {
            match self {
                TodoApi::List { page } => Some(json!({"page": page}).into()),
                _ => None,
            }
        }
    }

    #[test]
    fn list_endpoint_builds_get_with_query() {
        let request = Request::from_endpoint(&TodoApi::List { page: 2 });
        assert_eq!(request.method(), HttpMethod::Get);
        assert_eq!(request.url(), "https://api.example.com/todos?page=2");
        assert!(request.body().is_none());
    }

    #[test]
    fn create_endpoint_builds_post_with_json_body() {
        let request = Request::from_endpoint(&TodoApi::Create { title: "Buy milk".into() });
        assert_eq!(request.url(), "https://api.example.com/todos");
        let body: serde_json::Value = serde_json::from_slice(request.body().unwrap()).unwrap();
        assert_eq!(body, json!({"title": "Buy milk", "completed": false}));
        assert_eq!(request.header_fields()[headers::ACCEPT], headers::APPLICATION_JSON);
    }

    #[test]
    fn remove_endpoint_has_no_body() {
        let request = Request::from_endpoint(&TodoApi::Remove { id: 7 });
        assert_eq!(request.method(), HttpMethod::Delete);
        assert_eq!(request.url(), "https://api.example.com/todos/7");
        assert!(request.body().is_none());
    }

    #[test]
    fn same_endpoint_builds_equal_requests() {
        assert_eq!(
            Request::from_endpoint(&TodoApi::List { page: 1 }),
            Request::from_endpoint(&TodoApi::List { page: 1 })
        );
    }

    struct Configured {
        config: Arc<StaticConfiguration>,
    }

    impl ServiceEndpoint for Configured {
        fn base_url(&self) -> String {
            base_url_from(self.config.as_ref()).unwrap_or_default()
        }

        fn path(&self) -> String {
            "health".into()
        }

        fn request_generator(&self) -> Arc<dyn RequestGenerator> {
            Arc::new(RequestPipeline::new())
        }
    }

    #[test]
    fn base_url_and_generator_come_from_the_endpoint() {
        let endpoint = Configured {
            config: Arc::new(StaticConfiguration::new().with(keys::BASE_URL, "https://cfg.example.com")),
        };
        let request = Request::from_endpoint(&endpoint);
        assert_eq!(request.url(), "https://cfg.example.com/health");
        assert!(request.header_fields().is_empty());
    }
}
