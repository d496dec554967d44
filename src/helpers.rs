use actix_web::HttpRequest;

use crate::error::Error;

pub const OPERATOR_ROLE: &str = "operator";

/// Caller identity attached to each request by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: String,
    pub role: String,
}

impl Caller {
    pub fn is_operator(&self) -> bool {
        self.role == OPERATOR_ROLE
    }
}

pub fn caller_identity(req: &HttpRequest) -> Result<Caller, Error> {
    let id = match header_value(req, "x-user-id")? {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(Error::Unauthorized(String::from(
                "missing caller identity",
            )));
        },
    };

    let role = header_value(req, "x-user-role")?.unwrap_or_default();

    Ok(Caller { id, role })
}

pub fn require_operator(req: &HttpRequest) -> Result<Caller, Error> {
    let caller = caller_identity(req)?;

    if !caller.is_operator() {
        return Err(Error::Forbidden(String::from("operator role required")));
    }

    Ok(caller)
}

fn header_value(
    req: &HttpRequest,
    name: &str,
) -> Result<Option<String>, Error> {
    if let Some(item) = req.headers().get(name) {
        // a header the auth layer could not have produced is a caller
        // problem, not a server one
        let value = item.to_str().map_err(|_| {
            Error::Unauthorized(format!("invalid {} header", name))
        })?;
        return Ok(Some(value.to_string()));
    }

    Ok(None)
}
