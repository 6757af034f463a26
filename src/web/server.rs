use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ForecastError;
use crate::ml::Forecaster;

const INDEX_TEMPLATE: &str = include_str!("../../static/index.html");
const MODEL_OPTIONS_SLOT: &str = "{{model_options}}";

#[derive(Clone)]
pub struct WebServer {
    forecaster: Forecaster,
    static_dir: PathBuf,
}

impl WebServer {
    pub fn new(forecaster: Forecaster, static_dir: PathBuf) -> Self {
        Self {
            forecaster,
            static_dir,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(serve_index))
            .route("/predict", post(predict))
            .nest_service("/static", ServeDir::new(&self.static_dir))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn bind(&self, host: &str, port: u16) -> Result<TcpListener> {
        let listener = TcpListener::bind(format!("{}:{}", host, port))
            .await
            .with_context(|| format!("failed to bind {}:{}", host, port))?;
        info!("Forecast server listening on http://{}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serves until `shutdown` resolves; a serve error is returned to the caller.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Forecast server stopped");
        Ok(())
    }
}

impl IntoResponse for ForecastError {
    fn into_response(self) -> Response {
        let status = match &self {
            ForecastError::UnknownModel(_) => StatusCode::NOT_FOUND,
            ForecastError::InvalidInput(_) | ForecastError::InvalidDate { .. } => {
                StatusCode::BAD_REQUEST
            }
            ForecastError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, "Prediction failed: {}", self);

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Renders the page with one `<option>` per registered model.
pub fn render_index(model_names: &[String]) -> String {
    let options: String = model_names
        .iter()
        .map(|name| {
            let escaped = escape_html(name);
            format!("<option value=\"{0}\">{0}</option>\n", escaped)
        })
        .collect();

    INDEX_TEMPLATE.replace(MODEL_OPTIONS_SLOT, &options)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// Handlers
async fn serve_index(State(server): State<WebServer>) -> Html<String> {
    Html(render_index(server.forecaster.model_names()))
}

/// Year and month stay strings so bad numbers get a 400 instead of a rejection.
#[derive(Debug, Deserialize)]
struct PredictForm {
    model: String,
    year: String,
    month: String,
}

async fn predict(
    State(server): State<WebServer>,
    Form(form): Form<PredictForm>,
) -> Result<Json<serde_json::Value>, ForecastError> {
    let prediction = server
        .forecaster
        .predict_raw(&form.model, &form.year, &form.month)?;

    info!(
        model = %prediction.model,
        date = %prediction.date,
        normalized = prediction.normalized,
        "Predicted {:.2}",
        prediction.value
    );

    Ok(Json(json!({ "prediction": prediction.value })))
}
