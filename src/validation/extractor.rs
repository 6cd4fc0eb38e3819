use crate::error::{AppError, ErrorContext, ErrorWithContext};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Build a 400 carrying every field error.
///
/// Errors of nested (flattened) structs are reported under their own
/// field names.
pub fn validation_error(errors: &ValidationErrors) -> ErrorWithContext {
    let mut context = ErrorContext::new();
    let mut fields: Vec<String> = Vec::new();
    collect_field_errors(errors, &mut context, &mut fields);
    fields.sort_unstable();
    fields.dedup();

    ErrorWithContext::new(
        AppError::bad_request(format!("Validation failed: {}", fields.join(", "))),
        context,
    )
}

fn collect_field_errors(
    errors: &ValidationErrors,
    context: &mut ErrorContext,
    fields: &mut Vec<String>,
) {
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(errors) => {
                for error in errors {
                    let msg = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    context
                        .field_errors
                        .entry(field.to_string())
                        .or_default()
                        .push(msg);
                }
                fields.push(field.to_string());
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(nested, context, fields),
            ValidationErrorsKind::List(entries) => {
                for nested in entries.values() {
                    collect_field_errors(nested, context, fields);
                }
            }
        }
    }
}

fn rejection(error: AppError) -> ErrorWithContext {
    ErrorWithContext::new(error, ErrorContext::new())
}

/// JSON body that passed validation.
///
/// ```rust,ignore
/// async fn update(ValidatedJson(req): ValidatedJson<UpdateProfileRequest>) { }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ErrorWithContext;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| rejection(AppError::bad_request(format!("Invalid JSON: {}", e))))?;

        value.validate().map_err(|errors| validation_error(&errors))?;
        Ok(Self(value))
    }
}

/// Query string that passed validation.
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ErrorWithContext;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await.map_err(|e| {
            rejection(AppError::bad_request(format!("Invalid query parameters: {}", e)))
        })?;

        value.validate().map_err(|errors| validation_error(&errors))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct DayRequest {
        #[validate(range(min = 1, max = 31, message = "must be between 1 and 31"))]
        day: i64,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body() {
        let ValidatedJson(req) = ValidatedJson::<DayRequest>::from_request(json_request(r#"{"day": 15}"#), &())
            .await
            .unwrap();
        assert_eq!(req.day, 15);
    }

    #[tokio::test]
    async fn test_field_errors_in_response() {
        let Err(rejection) =
            ValidatedJson::<DayRequest>::from_request(json_request(r#"{"day": 40}"#), &()).await
        else {
            panic!("expected rejection");
        };
        assert_eq!(
            rejection.context().field_errors.get("day"),
            Some(&vec!["must be between 1 and 31".to_string()])
        );
        assert_eq!(rejection.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let result = ValidatedJson::<DayRequest>::from_request(json_request("{"), &()).await;
        assert!(result.is_err());
    }
}
