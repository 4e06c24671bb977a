use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::error::FormError;
use crate::form::{FormController, FormView, Selection, success_message, today};
use crate::record::{AllowedValue, Record, RecordKey, UpsertOutcome};

const FORM_TEMPLATE: &str = "form";

pub struct AppState {
    pub controller: FormController,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(controller: FormController) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string(FORM_TEMPLATE, include_str!("../templates/form.hbs"))?;
        Ok(AppState {
            controller,
            templates,
        })
    }

    fn render_page(
        &self,
        status: StatusCode,
        view: Option<&FormView>,
        success: Option<String>,
        error: Option<String>,
    ) -> Response {
        match self.templates.render(FORM_TEMPLATE, &page_context(view, success, error)) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                log::error!("failed to render form: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
            }
        }
    }
}

/// Query string of `GET /`.
#[derive(Debug, Default, Deserialize)]
pub struct FormQuery {
    pub date: Option<NaiveDate>,
    pub student: Option<String>,
    pub assignment: Option<String>,
    pub lap: Option<i64>,
    /// Outcome of the save that redirected here.
    pub saved: Option<String>,
}

impl FormQuery {
    fn selection(&self) -> Selection {
        Selection {
            date: self.date,
            student: self.student.clone(),
            assignment: self.assignment.clone(),
            lap: self.lap,
        }
    }
}

/// A fully specified save, from the HTML form or the JSON API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(alias = "student")]
    pub student_name: String,
    pub date: NaiveDate,
    pub assignment: String,
    pub lap: i64,
    pub value: String,
}

impl SaveRequest {
    fn record(&self) -> Record {
        let key = RecordKey::new(
            self.student_name.as_str(),
            self.date.to_string(),
            self.assignment.as_str(),
            self.lap,
        );
        Record::new(key, self.value.as_str())
    }

    fn selection(&self) -> Selection {
        Selection {
            date: Some(self.date),
            student: Some(self.student_name.clone()),
            assignment: Some(self.assignment.clone()),
            lap: Some(self.lap),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValuesQuery {
    assignment: String,
    lap: i64,
}

#[derive(Serialize)]
struct UpsertResponse {
    status: &'static str,
    result: UpsertOutcome,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

fn status_for(err: &FormError) -> StatusCode {
    if err.is_user_facing() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if !self.is_user_facing() {
            log::error!("request failed: {self}");
        }
        let body = ErrorResponse {
            status: "error",
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn select_options<T: ToString + PartialEq>(items: &[T], selected: Option<&T>) -> serde_json::Value {
    items
        .iter()
        .map(|item| {
            json!({
                "value": item.to_string(),
                "selected": Some(item) == selected,
            })
        })
        .collect()
}

fn page_context(
    view: Option<&FormView>,
    success: Option<String>,
    error: Option<String>,
) -> serde_json::Value {
    let form = view.map(|v| {
        json!({
            "date": v.date,
            "students": select_options(&v.options.students, v.student.as_ref()),
            "assignments": select_options(&v.options.assignments, v.assignment.as_ref()),
            "laps": select_options(&v.options.laps, v.lap.as_ref()),
            "student": v.student,
            "assignment": v.assignment,
            "lap": v.lap,
            "warning": v.warning,
            "config_error": v.config_error,
            "notice": v.notice,
            "value_options": v.value_options,
            "can_save": v.can_save(),
        })
    });

    json!({
        "title": "Academic Monitoring Tool",
        "form": form,
        "success": success,
        "error": error,
    })
}

fn form_url(request: &SaveRequest, outcome: UpsertOutcome) -> String {
    format!(
        "/?date={}&student={}&assignment={}&lap={}&saved={}",
        request.date,
        urlencoding::encode(&request.student_name),
        urlencoding::encode(&request.assignment),
        request.lap,
        outcome
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_form))
        .route("/save", post(save_form))
        .route("/api/options", get(get_options))
        .route("/api/values", get(get_values))
        .route("/api/records", get(list_records).post(upsert_record))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

pub async fn run(bind: &str, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(state));

    let listener = TcpListener::bind(bind).await?;
    log::info!("Listening on http://{bind}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_form(State(state): State<Arc<AppState>>, Query(query): Query<FormQuery>) -> Response {
    let success = query
        .saved
        .as_deref()
        .and_then(UpsertOutcome::parse)
        .map(success_message);

    match state.controller.view(&query.selection(), today()).await {
        Ok(view) => state.render_page(StatusCode::OK, Some(&view), success, None),
        Err(err) => {
            log::error!("failed to load form: {err}");
            state.render_page(status_for(&err), None, None, Some(err.to_string()))
        }
    }
}

async fn save_form(State(state): State<Arc<AppState>>, Form(request): Form<SaveRequest>) -> Response {
    let record = request.record();
    match state.controller.submit(&record).await {
        Ok(outcome) => Redirect::to(&form_url(&request, outcome)).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if !err.is_user_facing() {
                log::error!("save of {} failed: {err}", record.key());
            }
            let view = state.controller.view(&request.selection(), today()).await.ok();
            state.render_page(status, view.as_ref(), None, Some(err.to_string()))
        }
    }
}

async fn get_options(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, FormError> {
    Ok(Json(state.controller.options().await?))
}

async fn get_values(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValuesQuery>,
) -> Result<Json<Vec<AllowedValue>>, FormError> {
    Ok(Json(
        state
            .controller
            .value_options(&query.assignment, query.lap)
            .await?,
    ))
}

async fn list_records(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Record>>, FormError> {
    Ok(Json(state.controller.records().await?))
}

async fn upsert_record(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveRequest>,
) -> Result<Json<UpsertResponse>, FormError> {
    let outcome = state.controller.submit(&request.record()).await?;
    Ok(Json(UpsertResponse {
        status: "ok",
        result: outcome,
    }))
}
