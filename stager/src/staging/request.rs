//! Builds the staging request sent to a worker

use staging_wire::{Resources, ServiceBindingDescriptor, StagingProperties, StagingRequest};

use crate::artifacts::ArtifactStore;
use crate::errors::StagerError;
use crate::models::app::{App, ServiceBinding};

/// Build the staging request for an app snapshot.
///
/// Fails with `ValidationError` when the app has no framework or a service
/// binding cannot be resolved to its service.
pub fn build_staging_request(
    app: &App,
    artifacts: &dyn ArtifactStore,
) -> Result<StagingRequest, StagerError> {
    let framework = app.framework.as_ref().ok_or_else(|| {
        StagerError::ValidationError(format!("app {} has no framework", app.guid))
    })?;

    let services = app
        .service_bindings
        .iter()
        .map(|binding| service_binding_descriptor(&app.guid, binding))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StagingRequest {
        app_id: app.guid.clone(),
        properties: StagingProperties {
            services,
            framework: framework.name.clone(),
            framework_info: framework.internal_info.clone(),
            buildpack: app.buildpack.clone(),
            resources: Resources {
                memory: app.memory,
                disk: app.disk_quota,
                fds: app.file_descriptors,
            },
            environment: app.environment(),
            meta: serde_json::Value::Object(app.metadata.clone()),
        },
        download_uri: artifacts.app_uri(&app.guid),
        upload_uri: artifacts.droplet_upload_uri(&app.guid),
    })
}

fn service_binding_descriptor(
    app_id: &str,
    binding: &ServiceBinding,
) -> Result<ServiceBindingDescriptor, StagerError> {
    let missing = |what: &str| {
        StagerError::ValidationError(format!("service binding of app {} has no {}", app_id, what))
    };

    let instance = binding
        .service_instance
        .as_ref()
        .ok_or_else(|| missing("service instance"))?;
    let plan = instance
        .service_plan
        .as_ref()
        .ok_or_else(|| missing("service plan"))?;
    let service = plan.service.as_ref().ok_or_else(|| missing("service"))?;

    Ok(ServiceBindingDescriptor {
        label: format!("{}-{}", service.label, service.version),
        tags: serde_json::Map::new(),
        name: instance.name.clone(),
        credentials: binding.credentials.clone(),
        options: binding
            .binding_options
            .clone()
            .unwrap_or_else(|| serde_json::json!({})),
        plan: plan.name.clone(),
        plan_options: serde_json::Map::new(),
    })
}
