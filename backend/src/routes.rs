use std::io::Write;
use std::sync::{Arc, Mutex};

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use serde::Deserialize;
use shared::{AnalyzeResponse, ErrorResponse, HeatmapStyle};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AnalyzeError;
use crate::explain::render;
use crate::model::{self, Classifier};

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: String) {
    cfg.service(web::resource("/").route(web::get().to(health)))
        .service(web::resource("/analyze").route(web::post().to(handle_analyze)))
        .service(Files::new("/static", static_dir).index_file("index.html"));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("DeepSight backend live!")
}

/// Optional per-request overrides for the rendered overlay.
#[derive(Debug, Default, Deserialize)]
struct AnalyzeOptions {
    style: Option<HeatmapStyle>,
    alpha: Option<f32>,
}

async fn handle_analyze(
    model: web::Data<Arc<Mutex<Classifier>>>,
    settings: web::Data<Settings>,
    options: web::Query<AnalyzeOptions>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4();
    let mut image_data: Vec<u8> = Vec::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        if field.name() != Some("image") {
            continue;
        }
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            image_data.write_all(&data)?;
        }
        if !image_data.is_empty() {
            break;
        }
    }

    if image_data.is_empty() {
        info!("[{}] rejected: no image in request", request_id);
        return Ok(HttpResponse::Ok().json(AnalyzeError::MissingInput.to_response()));
    }

    let style = options.style.unwrap_or(settings.heatmap_style);
    let alpha = options
        .alpha
        .unwrap_or(settings.heatmap_alpha)
        .clamp(0.0, 1.0);

    match analyze(&model, &image_data, style, alpha) {
        Ok(response) => {
            info!(
                "[{}] classified as '{}' ({:.3})",
                request_id, response.result, response.confidence
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            error!("[{}] analysis failed: {}", request_id, e);
            Ok(HttpResponse::Ok().json(ErrorResponse::new(e.to_string())))
        }
    }
}

/// Run the full pipeline on one image: decode, classify, attribute, render.
fn analyze(
    model: &Mutex<Classifier>,
    bytes: &[u8],
    style: HeatmapStyle,
    alpha: f32,
) -> Result<AnalyzeResponse, AnalyzeError> {
    let rgb = model::decode_rgb(bytes)?;
    let input = model::to_input_tensor(&rgb);

    let model = model.lock().unwrap();
    let prediction = model.predict(&input)?;
    let heatmap = model.grad_cam(&input, prediction.class_index)?;
    drop(model);

    let overlay = render::render_overlay(&heatmap, &rgb, style, alpha)?;
    let explanation = explanation_sentence(&prediction.label, prediction.confidence);

    Ok(AnalyzeResponse::success(
        prediction.label,
        prediction.confidence,
        explanation,
        overlay,
    ))
}

fn explanation_sentence(label: &str, confidence: f32) -> String {
    format!(
        "CNN model thinks it's most likely a '{}' ({:.1}%)",
        label,
        confidence * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn health_returns_a_liveness_body() {
        let resp = health().await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, actix_web::web::Bytes::from("DeepSight backend live!"));
    }

    #[test]
    fn missing_input_body_matches_the_contract() {
        let body =
            serde_json::to_string(&AnalyzeError::MissingInput.to_response()).unwrap();
        assert_eq!(body, r#"{"status":"error","message":"No image provided"}"#);
    }

    #[test]
    fn explanation_embeds_label_and_percentage() {
        let sentence = explanation_sentence("golden retriever", 0.934);
        assert_eq!(
            sentence,
            "CNN model thinks it's most likely a 'golden retriever' (93.4%)"
        );
    }

    #[test]
    fn analyze_options_deserialize_from_query_strings() {
        let opts: AnalyzeOptions =
            serde_urlencoded::from_str("style=hot&alpha=0.7").unwrap();
        assert_eq!(opts.style, Some(HeatmapStyle::Hot));
        assert_eq!(opts.alpha, Some(0.7));

        let empty: AnalyzeOptions = serde_urlencoded::from_str("").unwrap();
        assert!(empty.style.is_none() && empty.alpha.is_none());
    }
}
