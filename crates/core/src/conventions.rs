//! Project-specific route convention checks.
//!
//! Kept apart from [`crate::validation`] so the generic validator carries no
//! knowledge of any one application's layout. Every finding here is a
//! warning; conventions never block a patch.

use std::collections::HashSet;

use crate::patch::{FileChange, PatchData};

/// Page file names recognised by the App Router.
const APP_ROUTER_PAGE_FILES: &[&str] = &["page.tsx", "page.ts", "page.jsx", "page.js"];

/// Routing conventions of the target project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteConventions {
    /// The project routes through `app/` (Next.js App Router).
    pub app_router: bool,
    /// Route paths that already have a page, e.g. `/dashboard/settings`.
    pub existing_routes: HashSet<String>,
}

impl RouteConventions {
    /// Derive conventions from the project's file list.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut conventions = Self::default();
        for path in paths {
            if let Some(route) = app_route_for(path) {
                conventions.app_router = true;
                conventions.existing_routes.insert(route);
            }
        }
        conventions
    }

    /// Warnings for a patch that fights the project's routing layout.
    pub fn check(&self, patch: &PatchData) -> Vec<String> {
        let mut warnings = Vec::new();
        for change in &patch.files {
            let FileChange::Create { path, .. } = change else {
                continue;
            };

            if self.app_router && is_pages_router_path(path) {
                warnings.push(format!(
                    "File '{path}' uses the Pages Router layout but this project uses the App Router"
                ));
            }

            if let Some(route) = app_route_for(path) {
                if self.existing_routes.contains(&route) {
                    warnings.push(format!(
                        "File '{path}' creates a page for route '{route}', which already exists"
                    ));
                }
            }
        }
        warnings
    }
}

/// Route served by an App Router page file, ignoring route groups.
fn app_route_for(path: &str) -> Option<String> {
    let normalized = path.trim_start_matches("./");
    let rest = normalized
        .strip_prefix("src/app/")
        .or_else(|| normalized.strip_prefix("app/"))?;

    let (dir, file) = match rest.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", rest),
    };
    if !APP_ROUTER_PAGE_FILES.contains(&file) {
        return None;
    }

    let segments: Vec<&str> = dir
        .split('/')
        .filter(|s| !s.is_empty() && !(s.starts_with('(') && s.ends_with(')')))
        .collect();
    Some(format!("/{}", segments.join("/")))
}

fn is_pages_router_path(path: &str) -> bool {
    let normalized = path.trim_start_matches("./");
    (normalized.starts_with("pages/") || normalized.starts_with("src/pages/"))
        && !normalized.contains("/api/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
