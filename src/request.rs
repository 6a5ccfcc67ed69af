//! Request validator - routing checks, parameter parsing and input decoding.

use axum::body::Body;
use axum::http::{header, HeaderMap, Method};

use crate::codec::decode_body;
use crate::config::PayloadLimits;
use crate::error::XrpcError;
use crate::handler::{HandlerInput, MethodConfig, MethodId, MethodRegistry, Params};
use crate::lexicon::{MethodKind, SchemaRegistry};

/// A method that passed the routing checks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Route<'a> {
    pub kind: MethodKind,
    pub config: &'a MethodConfig,
}

/// Resolve the method and check the HTTP verb against its definition.
///
/// Ids with no definition, no registered handler, or a definition that
/// cannot be served over plain HTTP are all `MethodNotImplemented`; only
/// then is the verb checked.
pub(crate) fn check_route<'a, S>(
    schemas: &S,
    methods: &'a MethodRegistry,
    method_id: &str,
    verb: &Method,
) -> Result<Route<'a>, XrpcError>
where
    S: SchemaRegistry + ?Sized,
{
    let def = schemas
        .get_def(method_id)
        .ok_or_else(XrpcError::method_not_implemented)?;
    let config = methods
        .resolve(method_id)
        .ok_or_else(XrpcError::method_not_implemented)?;

    let kind = match def.method_kind() {
        Some(MethodKind::Subscription) | None => return Err(XrpcError::method_not_implemented()),
        Some(kind) => kind,
    };

    let expected = kind.http_method();
    if *verb != expected {
        return Err(XrpcError::invalid_request(format!(
            "Incorrect HTTP method ({verb}) expected {expected}"
        )));
    }

    Ok(Route { kind, config })
}

/// Parse the raw query string.
pub(crate) fn parse_params(query: Option<&str>) -> Result<Params, XrpcError> {
    Params::from_query(query.unwrap_or_default())
        .map_err(|e| XrpcError::invalid_request(format!("Invalid query string: {e}")))
}

/// The request's `Content-Type`, if any.
pub(crate) fn content_type(headers: &HeaderMap) -> Result<Option<String>, XrpcError> {
    headers
        .get(header::CONTENT_TYPE)
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| XrpcError::invalid_request("Invalid Content-Type header"))
        })
        .transpose()
}

/// Check parameters against the method's schema.
pub(crate) fn validate_params<S>(
    schemas: &S,
    method_id: &MethodId,
    params: &Params,
) -> Result<(), XrpcError>
where
    S: SchemaRegistry + ?Sized,
{
    schemas
        .assert_valid_params(method_id.as_str(), params)
        .map_err(|e| XrpcError::invalid_request(e.to_string()))
}

/// Decode and validate the request body.
///
/// Queries never read a body. A procedure must declare its encoding.
pub(crate) async fn decode_input<S>(
    schemas: &S,
    method_id: &MethodId,
    kind: MethodKind,
    content_type: Option<&str>,
    body: Body,
    limits: PayloadLimits,
) -> Result<Option<HandlerInput>, XrpcError>
where
    S: SchemaRegistry + ?Sized,
{
    if kind != MethodKind::Procedure {
        return Ok(None);
    }

    let Some(content_type) = content_type else {
        return Err(XrpcError::invalid_request(
            "Request encoding (Content-Type) required but not provided",
        ));
    };

    let input = decode_body(content_type, body, limits).await?;
    schemas
        .assert_valid_input(method_id.as_str(), &input)
        .map_err(|e| XrpcError::invalid_request(e.to_string()))?;

    Ok(Some(input))
}
