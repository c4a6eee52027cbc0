//! Response validators
//!
//! Pure checks on responses from the products API. Each validator either
//! returns the typed payload it vouched for or a [`ShapeError`] describing the
//! first deviation from the documented contract.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use storecheck_client::{ApiResponse, DeletedProduct, Product, ProductDetail, ProductEnvelope, SortOrder};
use thiserror::Error;

/// Fields every single-entity read or write carries
pub const MINIMUM_FIELDS: [&str; 4] = ["id", "title", "description", "price"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("expected status {expected}, got {actual}")]
    Status { expected: u16, actual: u16 },

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("envelope keys {actual:?} differ from {expected:?}")]
    EnvelopeKeys {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("field `{field}` should be {expected}, got {actual}")]
    WrongType {
        field: String,
        expected: &'static str,
        actual: String,
    },

    #[error("field `{field}` is {actual}, expected {expected}")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("payload did not decode: {0}")]
    Decode(String),
}

/// JSON type name, for error messages
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn expect_status(response: &ApiResponse, expected: u16) -> Result<(), ShapeError> {
    if response.status == expected {
        Ok(())
    } else {
        Err(ShapeError::Status {
            expected,
            actual: response.status,
        })
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, ShapeError> {
    value
        .as_object()
        .ok_or_else(|| ShapeError::NotAnObject(kind_of(value)))
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, ShapeError> {
    T::deserialize(value).map_err(|e| ShapeError::Decode(e.to_string()))
}

/// Fails if any of `required` is absent from `body`
pub fn validate_entity_shape(body: &Value, required: &[&str]) -> Result<(), ShapeError> {
    let object = as_object(body)?;
    match required.iter().find(|field| !object.contains_key(**field)) {
        Some(field) => Err(ShapeError::MissingField(field.to_string())),
        None => Ok(()),
    }
}

/// Status must be `expected_status`; a 200 must also carry a product.
///
/// Returns the decoded product for 200 responses and `None` for anything else
/// (a 404 is a legitimate answer here, not a failure).
pub fn validate_product_response(
    response: &ApiResponse,
    expected_status: u16,
) -> Result<Option<Product>, ShapeError> {
    expect_status(response, expected_status)?;
    if response.status != 200 {
        return Ok(None);
    }
    validate_entity_shape(&response.body, &MINIMUM_FIELDS)?;
    decode(&response.body).map(Some)
}

fn require_type(
    object: &Map<String, Value>,
    field: &str,
    expected: &'static str,
    accepts: fn(&Value) -> bool,
) -> Result<(), ShapeError> {
    let value = object
        .get(field)
        .ok_or_else(|| ShapeError::MissingField(field.to_string()))?;
    if accepts(value) {
        Ok(())
    } else {
        Err(ShapeError::WrongType {
            field: field.to_string(),
            expected,
            actual: kind_of(value).to_string(),
        })
    }
}

fn non_negative_integer(object: &Map<String, Value>, field: &str) -> Result<u64, ShapeError> {
    let value = object
        .get(field)
        .ok_or_else(|| ShapeError::MissingField(field.to_string()))?;
    value.as_u64().ok_or_else(|| ShapeError::WrongType {
        field: field.to_string(),
        expected: "non-negative integer",
        actual: value.to_string(),
    })
}

/// Checks the paginated envelope: status, exact key set
/// `{products, total, skip, limit}`, `products` an array, `total`/`skip`
/// non-negative integers and `limit` a positive integer.
pub fn validate_envelope_shape(
    response: &ApiResponse,
    expected_status: u16,
) -> Result<ProductEnvelope, ShapeError> {
    expect_status(response, expected_status)?;
    let object = as_object(&response.body)?;

    let mut actual: Vec<String> = object.keys().cloned().collect();
    actual.sort();
    let mut expected: Vec<String> = ProductEnvelope::KEYS.iter().map(|k| k.to_string()).collect();
    expected.sort();
    if actual != expected {
        return Err(ShapeError::EnvelopeKeys { expected, actual });
    }

    require_type(object, "products", "array", Value::is_array)?;
    non_negative_integer(object, "total")?;
    non_negative_integer(object, "skip")?;
    let limit = non_negative_integer(object, "limit")?;
    if limit == 0 {
        return Err(ShapeError::WrongType {
            field: "limit".to_string(),
            expected: "positive integer",
            actual: "0".to_string(),
        });
    }

    decode(&response.body)
}

/// The eleven-field detail contract, plus JSON type checks on the fields the
/// suite relies on
pub fn validate_product_detail(body: &Value) -> Result<ProductDetail, ShapeError> {
    validate_entity_shape(body, &ProductDetail::FIELDS)?;
    let object = as_object(body)?;

    require_type(object, "id", "number", Value::is_number)?;
    require_type(object, "title", "string", Value::is_string)?;
    require_type(object, "price", "number", Value::is_number)?;
    require_type(object, "rating", "number", Value::is_number)?;
    require_type(object, "images", "array", Value::is_array)?;

    decode(body)
}

/// A delete receipt for `id`: `{id, isDeleted: true, deletedOn: <text>}`
pub fn validate_deleted(response: &ApiResponse, id: u64) -> Result<DeletedProduct, ShapeError> {
    expect_status(response, 200)?;
    validate_entity_shape(&response.body, &["id", "isDeleted", "deletedOn"])?;
    let object = as_object(&response.body)?;

    require_type(object, "deletedOn", "string", Value::is_string)?;
    expect_field(&response.body, "id", &Value::from(id))?;
    expect_field(&response.body, "isDeleted", &Value::Bool(true))?;

    decode(&response.body)
}

/// Fails unless `body[field] == expected`
pub fn expect_field(body: &Value, field: &str, expected: &Value) -> Result<(), ShapeError> {
    let actual = body
        .get(field)
        .ok_or_else(|| ShapeError::MissingField(field.to_string()))?;
    if actual == expected {
        Ok(())
    } else {
        Err(ShapeError::Mismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Case-insensitive string ordering in the spirit of `localeCompare`:
/// letters compare by their lowercase form first, and on a tie lowercase
/// sorts before uppercase.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let folded = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<String>();
    folded(a).cmp(&folded(b)).then_with(|| b.cmp(a))
}

/// Whether `titles` is monotonic in `order` under [`locale_compare`]
pub fn is_sorted_by_locale<S: AsRef<str>>(titles: &[S], order: SortOrder) -> bool {
    titles.windows(2).all(|pair| {
        let ordering = locale_compare(pair[0].as_ref(), pair[1].as_ref());
        match order {
            SortOrder::Asc => ordering != Ordering::Greater,
            SortOrder::Desc => ordering != Ordering::Less,
        }
    })
}

/// Sort a copy of `titles` client-side under [`locale_compare`]
pub fn sort_by_locale<S: AsRef<str>>(titles: &[S], order: SortOrder) -> Vec<String> {
    let mut sorted: Vec<String> = titles.iter().map(|t| t.as_ref().to_string()).collect();
    sorted.sort_by(|a, b| match order {
        SortOrder::Asc => locale_compare(a, b),
        SortOrder::Desc => locale_compare(b, a),
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use test_case::test_case;

    fn response(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            status,
            body,
            elapsed: Duration::ZERO,
        }
    }

    fn detail() -> Value {
        json!({
            "id": 1,
            "title": "Essence Mascara Lash Princess",
            "description": "A popular mascara",
            "price": 9.99,
            "discountPercentage": 7.17,
            "rating": 4.94,
            "stock": 5,
            "brand": "Essence",
            "category": "beauty",
            "thumbnail": "https://cdn.dummyjson.com/products/images/1/thumbnail.png",
            "images": ["https://cdn.dummyjson.com/products/images/1/1.png"]
        })
    }

    fn envelope() -> Value {
        json!({"products": [detail()], "total": 194, "skip": 0, "limit": 30})
    }

    #[test]
    fn test_entity_shape_reports_first_missing_field() {
        let body = json!({"id": 1, "title": "t", "price": 1.0});
        assert_eq!(
            validate_entity_shape(&body, &MINIMUM_FIELDS),
            Err(ShapeError::MissingField("description".to_string()))
        );
        assert!(validate_entity_shape(&detail(), &MINIMUM_FIELDS).is_ok());
    }

    #[test]
    fn test_entity_shape_rejects_non_objects() {
        assert_eq!(
            validate_entity_shape(&json!([1, 2]), &MINIMUM_FIELDS),
            Err(ShapeError::NotAnObject("array"))
        );
    }

    #[test]
    fn test_valid_envelope() {
        let parsed = validate_envelope_shape(&response(200, envelope()), 200).unwrap();
        assert_eq!(parsed.total, 194);
        assert_eq!(parsed.products.len(), 1);
    }

    #[test_case(json!({"products": [], "total": 0, "skip": 0}) ; "missing limit")]
    #[test_case(json!({"products": [], "total": 0, "skip": 0, "limit": 30, "page": 1}) ; "extra key")]
    #[test_case(json!({"products": {}, "total": 0, "skip": 0, "limit": 30}) ; "products not array")]
    #[test_case(json!({"products": [], "total": -1, "skip": 0, "limit": 30}) ; "negative total")]
    #[test_case(json!({"products": [], "total": 0, "skip": 1.5, "limit": 30}) ; "fractional skip")]
    #[test_case(json!({"products": [], "total": 0, "skip": 0, "limit": 0}) ; "zero limit")]
    #[test_case(json!({"products": [], "total": "10", "skip": 0, "limit": 30}) ; "string total")]
    #[test_case(json!("products") ; "not an object")]
    fn test_invalid_envelopes(body: Value) {
        assert!(validate_envelope_shape(&response(200, body), 200).is_err());
    }

    #[test]
    fn test_envelope_status_must_match() {
        assert_eq!(
            validate_envelope_shape(&response(404, envelope()), 200).unwrap_err(),
            ShapeError::Status {
                expected: 200,
                actual: 404
            }
        );
    }

    #[test]
    fn test_product_response_for_expected_not_found() {
        let not_found = response(404, json!({"message": "Product with id '999' not found"}));
        assert_eq!(validate_product_response(&not_found, 404), Ok(None));
        assert!(validate_product_response(&not_found, 200).is_err());
    }

    #[test]
    fn test_product_response_decodes_product() {
        let product = validate_product_response(&response(200, detail()), 200)
            .unwrap()
            .unwrap();
        assert_eq!(product.id, 1);
        assert_eq!(product.brand.as_deref(), Some("Essence"));
    }

    #[test]
    fn test_product_detail_type_checks() {
        assert!(validate_product_detail(&detail()).is_ok());

        let mut wrong = detail();
        wrong["rating"] = json!("4.9");
        assert_eq!(
            validate_product_detail(&wrong).unwrap_err(),
            ShapeError::WrongType {
                field: "rating".to_string(),
                expected: "number",
                actual: "string".to_string(),
            }
        );

        let mut missing = detail();
        missing.as_object_mut().unwrap().remove("thumbnail");
        assert_eq!(
            validate_product_detail(&missing).unwrap_err(),
            ShapeError::MissingField("thumbnail".to_string())
        );
    }

    #[test]
    fn test_deleted_receipt() {
        let body = json!({
            "id": 1,
            "title": "Essence Mascara Lash Princess",
            "isDeleted": true,
            "deletedOn": "2024-05-19T13:55:21.812Z"
        });
        let receipt = validate_deleted(&response(200, body.clone()), 1).unwrap();
        assert!(receipt.is_deleted);

        assert!(matches!(
            validate_deleted(&response(200, body), 2),
            Err(ShapeError::Mismatch { .. })
        ));

        let not_deleted = json!({"id": 1, "isDeleted": false, "deletedOn": "x"});
        assert!(validate_deleted(&response(200, not_deleted), 1).is_err());

        let numeric_date = json!({"id": 1, "isDeleted": true, "deletedOn": 1716126921});
        assert!(matches!(
            validate_deleted(&response(200, numeric_date), 1),
            Err(ShapeError::WrongType { .. })
        ));
    }

    #[test]
    fn test_locale_compare_ignores_case_first() {
        assert_eq!(locale_compare("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_compare("Zebra", "apple"), Ordering::Greater);
        assert_eq!(locale_compare("a", "A"), Ordering::Less);
        assert_eq!(locale_compare("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_sorted_checks() {
        let titles = ["Apple", "banana", "Cherry"];
        assert!(is_sorted_by_locale(&titles, SortOrder::Asc));
        assert!(!is_sorted_by_locale(&titles, SortOrder::Desc));

        let descending = sort_by_locale(&titles, SortOrder::Desc);
        assert_eq!(descending, vec!["Cherry", "banana", "Apple"]);
        assert!(is_sorted_by_locale(&descending, SortOrder::Desc));
    }
}
