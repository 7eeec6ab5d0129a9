//! Request validation for entity writes.
//!
//! Every check runs and all problems are reported together, the same way
//! settings validation works.

use std::collections::HashSet;

use crate::store::{
    ClusterChanges, DestinationInput, HeaderInput, NewCluster, NewRoute, RouteChanges,
};

use super::ServiceError;

fn finish(errors: Vec<String>) -> Result<(), ServiceError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(errors))
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn check_destinations(destinations: &[DestinationInput], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for destination in destinations {
        if blank(&destination.destination_id) {
            errors.push("destination_id must not be empty".to_string());
        } else if !seen.insert(destination.destination_id.as_str()) {
            errors.push(format!(
                "destination_id '{}' is listed more than once",
                destination.destination_id
            ));
        }
    }
}

fn check_headers(headers: &[HeaderInput], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for header in headers {
        if blank(&header.name) {
            errors.push("header name must not be empty".to_string());
        } else if !seen.insert(header.name.as_str()) {
            errors.push(format!("header '{}' is listed more than once", header.name));
        }
    }
}

fn check_transforms(transforms: &[String], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for pattern in transforms {
        if blank(pattern) {
            errors.push("transform path pattern must not be empty".to_string());
        } else if !seen.insert(pattern.as_str()) {
            errors.push(format!("transform '{pattern}' is listed more than once"));
        }
    }
}

fn check_methods(methods: &[String], errors: &mut Vec<String>) {
    if methods.iter().any(|m| blank(m)) {
        errors.push("methods must not contain empty entries".to_string());
    }
}

pub fn validate_new_cluster(request: &NewCluster) -> Result<(), ServiceError> {
    let mut errors = Vec::new();

    if blank(&request.cluster_id) {
        errors.push("cluster_id must not be empty".to_string());
    }
    if request.destinations.is_empty() {
        errors.push("a cluster needs at least one destination".to_string());
    }
    check_destinations(&request.destinations, &mut errors);

    let health = &request.health_check;
    if health.enabled {
        if health.interval_secs <= 0 {
            errors.push("health check interval must be positive".to_string());
        }
        if health.timeout_secs <= 0 {
            errors.push("health check timeout must be positive".to_string());
        }
    }

    finish(errors)
}

pub fn validate_cluster_changes(changes: &ClusterChanges) -> Result<(), ServiceError> {
    let mut errors = Vec::new();

    if changes.cluster_id.as_deref().is_some_and(blank) {
        errors.push("cluster_id must not be empty".to_string());
    }
    if changes.health_check_interval_secs.is_some_and(|v| v <= 0) {
        errors.push("health check interval must be positive".to_string());
    }
    if changes.health_check_timeout_secs.is_some_and(|v| v <= 0) {
        errors.push("health check timeout must be positive".to_string());
    }
    if let Some(destinations) = &changes.destinations {
        check_destinations(destinations, &mut errors);
    }

    finish(errors)
}

pub fn validate_new_route(request: &NewRoute) -> Result<(), ServiceError> {
    let mut errors = Vec::new();

    if blank(&request.route_id) {
        errors.push("route_id must not be empty".to_string());
    }
    if blank(&request.path) {
        errors.push("path must not be empty".to_string());
    }
    check_methods(&request.methods, &mut errors);
    check_headers(&request.headers, &mut errors);
    check_transforms(&request.transforms, &mut errors);

    finish(errors)
}

pub fn validate_route_changes(changes: &RouteChanges) -> Result<(), ServiceError> {
    let mut errors = Vec::new();

    if changes.route_id.as_deref().is_some_and(blank) {
        errors.push("route_id must not be empty".to_string());
    }
    if changes.path.as_deref().is_some_and(blank) {
        errors.push("path must not be empty".to_string());
    }
    if let Some(methods) = &changes.methods {
        check_methods(methods, &mut errors);
    }
    if let Some(headers) = &changes.headers {
        check_headers(headers, &mut errors);
    }
    if let Some(transforms) = &changes.transforms {
        check_transforms(transforms, &mut errors);
    }

    finish(errors)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::store::HealthCheckSettings;

    fn new_cluster() -> NewCluster {
        NewCluster {
            cluster_id: "c1".into(),
            load_balancing_policy: None,
            health_check: HealthCheckSettings::default(),
            is_active: true,
            destinations: vec![DestinationInput {
                destination_id: "d1".into(),
                address: Some("http://h1".into()),
                is_active: true,
            }],
            actor: None,
        }
    }

    fn messages(err: ServiceError) -> Vec<String> {
        match err {
            ServiceError::Validation(messages) => messages,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_cluster_passes() {
        assert!(validate_new_cluster(&new_cluster()).is_ok());
    }

    #[test]
    fn test_cluster_collects_all_problems() {
        let mut request = new_cluster();
        request.cluster_id = "  ".into();
        request.destinations.clear();
        request.health_check.enabled = true;
        request.health_check.timeout_secs = 0;

        let errors = messages(validate_new_cluster(&request).unwrap_err());
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_duplicate_destination_ids_rejected() {
        let mut request = new_cluster();
        request.destinations.push(request.destinations[0].clone());
        let errors = messages(validate_new_cluster(&request).unwrap_err());
        assert!(errors[0].contains("more than once"));
    }

    #[test]
    fn test_disabled_health_check_ignores_intervals() {
        let mut request = new_cluster();
        request.health_check.interval_secs = 0;
        assert!(validate_new_cluster(&request).is_ok());
    }

    #[test]
    fn test_route_requires_id_and_path() {
        let request = NewRoute {
            route_id: "".into(),
            path: "".into(),
            methods: vec!["GET".into(), " ".into()],
            rate_limiter_policy: None,
            cluster: Uuid::new_v4(),
            is_active: true,
            headers: vec![],
            transforms: vec![],
            actor: None,
        };
        let errors = messages(validate_new_route(&request).unwrap_err());
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_empty_changes_are_valid() {
        assert!(validate_cluster_changes(&ClusterChanges::default()).is_ok());
        assert!(validate_route_changes(&RouteChanges::default()).is_ok());

        let changes = RouteChanges {
            path: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_route_changes(&changes).is_err());
    }
}
