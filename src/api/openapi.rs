use crate::api::handlers::{auth, health, register};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that serves the forward-auth endpoints and drives the `OpenAPI`
/// document. Routes added outside (`OPTIONS /health`, `/openapi.json`) are
/// not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::auth))
        .routes(routes!(register::register));

    let mut forward_auth = Tag::new("forward-auth");
    forward_auth.description =
        Some("Endpoints consulted by the reverse proxy auth request".to_string());
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Process status".to_string());
    router.get_openapi_mut().tags = Some(vec![forward_auth, health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

// Cargo authors are `:` separated and may include "Name <email>".
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split(':').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (
            optional_str(name),
            optional_str(email.trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_documents_forward_auth_paths() {
        let doc = openapi();
        assert!(doc.paths.paths.contains_key("/auth"));
        assert!(doc.paths.paths.contains_key("/register"));
        assert!(doc.paths.paths.contains_key("/health"));
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn parse_author_with_email() {
        assert_eq!(
            parse_author("Team Permesi <team@permesi.dev>"),
            (Some("Team Permesi"), Some("team@permesi.dev"))
        );
    }

    #[test]
    fn parse_author_without_email() {
        assert_eq!(parse_author("Team Permesi"), (Some("Team Permesi"), None));
        assert_eq!(parse_author("  "), (None, None));
    }

    #[test]
    fn contact_uses_first_author() {
        let contact = cargo_contact("A <a@example.com>:B <b@example.com>");
        assert_eq!(
            contact.and_then(|contact| contact.email),
            Some("a@example.com".to_string())
        );
        assert!(cargo_contact("").is_none());
    }
}
