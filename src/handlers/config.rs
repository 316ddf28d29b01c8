use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "services": {
                "completion_model": config.services.completion_model,
                "transcription_model": config.services.transcription_model,
                "request_timeout_secs": config.services.request_timeout_secs,
                "synthesis_deadline_secs": config.services.synthesis_deadline_secs,
                "synthesis_inactivity_secs": config.services.synthesis_inactivity_secs,
                "default_voice_id": config.services.default_voice_id
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "channels": config.audio.channels,
                "bit_depth": config.audio.bit_depth,
                "speech_threshold": config.audio.speech_threshold,
                "pause_threshold": config.audio.pause_threshold,
                "min_utterance_secs": config.audio.min_utterance_secs
            },
            "interview": {
                "question_count": config.interview.question_count,
                "feedback_interval_ms": config.interview.feedback_interval_ms,
                "min_feedback_transcript_len": config.interview.min_feedback_transcript_len,
                "min_summary_transcript_len": config.interview.min_summary_transcript_len
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "services": {
                "completion_model": current_config.services.completion_model,
                "transcription_model": current_config.services.transcription_model,
                "request_timeout_secs": current_config.services.request_timeout_secs,
                "default_voice_id": current_config.services.default_voice_id
            },
            "audio": {
                "speech_threshold": current_config.audio.speech_threshold,
                "pause_threshold": current_config.audio.pause_threshold,
                "min_utterance_secs": current_config.audio.min_utterance_secs
            },
            "interview": {
                "question_count": current_config.interview.question_count,
                "feedback_interval_ms": current_config.interview.feedback_interval_ms
            },
            "performance": {
                "max_concurrent_sessions": current_config.performance.max_concurrent_sessions
            }
        }
    })))
}
