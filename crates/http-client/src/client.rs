use async_trait::async_trait;
use carebook_core::constants::{BOOKINGS_SEGMENT, IDEMPOTENCY_KEY_HEADER, PAYMENT_PROOF_FIELD};
use carebook_core::{
    endpoint_url, ApiError, ApiErrorBody, BookingApi, BookingConfig, BookingConfirmation,
    BookingSubmission, Choice, StepQuery,
};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};

/// reqwest client for the remote booking API.
#[derive(Debug, Clone)]
pub struct HttpBookingApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBookingApi {
    /// Creates a client from the startup configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the underlying HTTP client cannot be built.
    pub fn new(config: &BookingConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url().clone(),
            token: config.api_token().map(str::to_owned),
        })
    }

    fn authorised(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn fetch_choices(&self, query: &StepQuery) -> Result<Vec<Choice>, ApiError> {
        let url = query.url(&self.base_url);
        tracing::debug!("Fetching {} choices from {}", query.step(), url);

        let request = self.client.get(url);
        let response = self.authorised(request).send().await.map_err(transport)?;
        let response = check_status(response).await?;
        let elements: Vec<serde_json::Value> = response.json().await.map_err(decode)?;

        let step = query.step();
        let choices = elements
            .into_iter()
            .filter_map(|element| match Choice::from_value(step, element) {
                Ok(choice) => Some(choice),
                Err(reason) => {
                    tracing::warn!(%step, %reason, "skipping malformed remote entity");
                    None
                }
            })
            .collect();

        Ok(choices)
    }

    async fn submit_booking(
        &self,
        submission: &BookingSubmission,
    ) -> Result<BookingConfirmation, ApiError> {
        let mut form = Form::new();
        for (name, value) in &submission.fields {
            form = form.text(*name, value.clone());
        }
        if let Some(attachment) = &submission.attachment {
            let part = Part::bytes(attachment.bytes().to_vec())
                .file_name(attachment.filename().to_owned())
                .mime_str(attachment.upload_media_type())
                .map_err(|e| ApiError::Transport(format!("invalid attachment media type: {e}")))?;
            form = form.part(PAYMENT_PROOF_FIELD, part);
        }

        let request = self
            .client
            .post(endpoint_url(&self.base_url, &[BOOKINGS_SEGMENT]))
            .header(IDEMPOTENCY_KEY_HEADER, submission.idempotency_key.as_str())
            .multipart(form);

        let response = self.authorised(request).send().await.map_err(transport)?;
        let response = check_status(response).await?;
        response.json().await.map_err(decode)
    }
}

/// Passes 2xx responses through; turns anything else into [`ApiError::Status`].
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .ok()
        .and_then(|text| serde_json::from_str::<ApiErrorBody>(&text).ok());

    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

fn decode(err: reqwest::Error) -> ApiError {
    ApiError::Decode(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use carebook_core::{EntityId, StepId};
    use carebook_files::Attachment;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn doctors(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        Json(json!([{
            "id": "P17",
            "name": format!(
                "{} in {}",
                params.get("specialization_id").map(String::as_str).unwrap_or("?"),
                params.get("city").map(String::as_str).unwrap_or("?")
            ),
            "price": "200"
        }]))
    }

    async fn bookings(headers: HeaderMap, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
        let mut fields = serde_json::Map::new();
        let mut proof = None;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == PAYMENT_PROOF_FIELD {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.unwrap();
                proof = Some(format!("{}:{}", filename, bytes.len()));
            } else {
                fields.insert(name, Value::String(field.text().await.unwrap()));
            }
        }

        match fields.get("slot_id").and_then(Value::as_str) {
            Some("taken") => {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({"message": "slot taken"})),
                )
            }
            Some("invalid") => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"errors": {"phone_number": ["unreachable"]}})),
                )
            }
            _ => {}
        }

        let key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (
            StatusCode::CREATED,
            Json(json!({
                "booking_id": key,
                "status": auth,
                "message": format!("{} fields, proof {}", fields.len(), proof.unwrap_or_default()),
            })),
        )
    }

    async fn serve() -> String {
        let app = Router::new()
            .route(
                "/specializations",
                get(|| async {
                    Json(json!([
                        {"id": 1, "name": "Cardiology"},
                        {"id": 2},
                        {"id": null, "name": "Ghost"},
                        {"name": "No id"},
                        "not an object",
                        {"id": 3, "name": "Dermatology", "label": "Skin"}
                    ]))
                }),
            )
            .route("/doctors", get(doctors))
            .route(
                "/clinics/:id/slots",
                get(|Path(id): Path<String>| async move {
                    if id == "down" {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else if id == "C/4" {
                        Ok(Json(json!([{"id": 7, "date": "2026-11-03", "time": "10:00"}])))
                    } else {
                        Ok(Json(json!([{"id": 5, "date": "2026-11-02", "time": "09:30", "price": 300}])))
                    }
                }),
            )
            .route("/bookings", post(bookings));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn api(base_url: &str, token: Option<&str>) -> HttpBookingApi {
        let config = BookingConfig::new(
            base_url,
            "patient-42",
            token.map(str::to_owned),
            Duration::from_secs(5),
            1024,
        )
        .expect("valid config");
        HttpBookingApi::new(&config).expect("client")
    }

    fn submission(slot_id: &str, attachment: Option<Attachment>) -> BookingSubmission {
        BookingSubmission {
            idempotency_key: "20261102T093000.000Z-abc".into(),
            fields: vec![
                ("patient_id", "patient-42".into()),
                ("slot_id", slot_id.into()),
                ("phone", "01001234567".into()),
            ],
            attachment,
        }
    }

    #[tokio::test]
    async fn test_fetch_skips_malformed_entities() {
        let base = serve().await;
        let choices = api(&base, None)
            .fetch_choices(&StepQuery::Specializations)
            .await
            .expect("fetch");

        let ids: Vec<&str> = choices.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(choices[0].label, "Cardiology");
        assert_eq!(choices[1].label, "Dermatology");
    }

    #[tokio::test]
    async fn test_fetch_encodes_ids_in_path() {
        let base = serve().await;

        let slots = api(&base, None)
            .fetch_choices(&StepQuery::ClinicSlots {
                location_id: EntityId::from("C/4"),
            })
            .await
            .expect("slots for an id containing a slash");

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id.as_str(), "7");
    }

    #[tokio::test]
    async fn test_submit_posts_under_base_path() {
        let base = serve().await;
        let nested = format!("{base}/api/v1/");
        let client = api(&nested, None);

        let err = client
            .submit_booking(&submission("S9", None))
            .await
            .expect_err("bookings live at the root of the test server");
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_fetch_sends_query_parameters() {
        let base = serve().await;
        let query = StepQuery::Providers {
            specialization_id: EntityId::from("3"),
            city: "New Cairo".into(),
        };
        assert_eq!(query.step(), StepId::Provider);

        let choices = api(&base, None).fetch_choices(&query).await.expect("fetch");

        assert_eq!(choices[0].label, "3 in New Cairo");
        assert_eq!(choices[0].price, Some(200.0));
    }

    #[tokio::test]
    async fn test_fetch_slots_and_status_errors() {
        let base = serve().await;
        let client = api(&base, None);

        let slots = client
            .fetch_choices(&StepQuery::ClinicSlots {
                location_id: EntityId::from("C4"),
            })
            .await
            .expect("slots");
        assert_eq!(slots[0].label, "2026-11-02 09:30");

        let err = client
            .fetch_choices(&StepQuery::ClinicSlots {
                location_id: EntityId::from("down"),
            })
            .await
            .expect_err("503");
        assert_eq!(err.status(), Some(503));

        let err = client
            .fetch_choices(&StepQuery::Cities {
                specialization_id: EntityId::from("1"),
            })
            .await
            .expect_err("no such route");
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_fetch_transport_error() {
        let err = api("http://127.0.0.1:1", None)
            .fetch_choices(&StepQuery::Specializations)
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_submit_sends_multipart_key_and_token() {
        let base = serve().await;
        let proof = Attachment::from_bytes("receipt.txt", b"paid".to_vec(), 1024).unwrap();

        let confirmation = api(&base, Some("secret"))
            .submit_booking(&submission("S9", Some(proof)))
            .await
            .expect("booking accepted");

        assert_eq!(confirmation.id.as_str(), "20261102T093000.000Z-abc");
        assert_eq!(confirmation.status.as_deref(), Some("Bearer secret"));
        assert_eq!(
            confirmation.message.as_deref(),
            Some("3 fields, proof receipt.txt:4")
        );
    }

    #[tokio::test]
    async fn test_submit_error_bodies() {
        let base = serve().await;
        let client = api(&base, None);

        let err = client
            .submit_booking(&submission("taken", None))
            .await
            .expect_err("conflict");
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body.and_then(|b| b.message).as_deref(), Some("slot taken"));
            }
            other => panic!("expected status error, got {other:?}"),
        }

        let err = client
            .submit_booking(&submission("invalid", None))
            .await
            .expect_err("validation");
        match err {
            ApiError::Status {
                status: 422,
                body: Some(body),
            } => assert_eq!(body.errors["phone_number"].joined(), "unreachable"),
            other => panic!("expected 422 with body, got {other:?}"),
        }
    }
}
