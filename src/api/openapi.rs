use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::handlers::{health, invitations, organizations, session};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and included in the generated `OpenAPI` spec.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut orgs_tag = Tag::new("orgs");
    orgs_tag.description = Some("Organization registration".to_string());

    let mut invitations_tag = Tag::new("invitations");
    invitations_tag.description =
        Some("Invitation lifecycle: create, search, accept, reject, cancel".to_string());

    let mut session_tag = Tag::new("session");
    session_tag.description = Some("Identity-provider login bootstrap".to_string());

    let mut base = cargo_openapi();
    base.tags = Some(vec![orgs_tag, invitations_tag, session_tag]);

    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let router = OpenApiRouter::with_openapi(base)
        .routes(routes!(health::health))
        .routes(routes!(session::create_session))
        .routes(routes!(organizations::create_org))
        .routes(routes!(
            invitations::create_invitation,
            invitations::list_my_invitations
        ))
        .routes(routes!(invitations::search_invitations))
        .routes(routes!(invitations::accept_invitation))
        .routes(routes!(invitations::reject_invitation))
        .routes(routes!(invitations::cancel_invitation));

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Presence"));
            assert_eq!(contact.email.as_deref(), Some("team@presence.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "orgs"));
        assert!(tags.iter().any(|tag| tag.name == "invitations"));

        assert!(spec.paths.paths.contains_key("/health"));
        assert!(spec.paths.paths.contains_key("/v1/session"));
        assert!(spec.paths.paths.contains_key("/v1/orgs"));
        assert!(spec.paths.paths.contains_key("/v1/invitations"));
        assert!(spec.paths.paths.contains_key("/v1/invitations/search"));
        assert!(spec.paths.paths.contains_key("/v1/invitations/accept"));
        assert!(spec.paths.paths.contains_key("/v1/invitations/reject"));
        assert!(spec.paths.paths.contains_key("/v1/invitations/cancel"));
    }
}
