//! Ready-made workflows.

use crate::{Workflow, WorkflowStep};

/// The seven-step "build me a mobile app" plan.
pub fn mobile_app_blueprint(app_name: &str, platform: &str) -> Workflow {
    let steps = [
        (
            "requirements",
            "Requirements",
            format!(
                "Define the target users, the core features and the screens of the {platform} \
                app \"{app_name}\". Keep the feature list to what a first release needs."
            ),
        ),
        (
            "architecture",
            "Architecture",
            format!(
                "Choose the project structure, state management approach and libraries for a \
                {platform} app. Describe the modules and how data flows between them."
            ),
        ),
        (
            "ui-design",
            "UI design",
            "Lay out every screen: components, navigation between screens and the design \
            tokens (colors, spacing, typography)."
                .to_string(),
        ),
        (
            "data-layer",
            "Data layer",
            "Define the data models, local persistence and the API client, including error \
            handling and offline behaviour."
                .to_string(),
        ),
        (
            "implementation",
            "Implementation",
            format!(
                "Write the source code for the screens and features of \"{app_name}\" \
                following the architecture and UI design above."
            ),
        ),
        (
            "testing",
            "Testing",
            "Write unit tests for the data layer and UI tests for the main user flows."
                .to_string(),
        ),
        (
            "release",
            "Release",
            format!(
                "List the build configuration, app store metadata and the steps to ship the \
                {platform} build of \"{app_name}\"."
            ),
        ),
    ];

    Workflow::new(
        format!("{app_name} ({platform})"),
        steps
            .into_iter()
            .map(|(id, name, description)| WorkflowStep::new(id, name, description))
            .collect(),
    )
}
