use crate::store::IssueRecord;

/// Module names and the keywords that usually point at them.
pub const MODULE_GLOSSARY: &[(&str, &str)] = &[
    ("flow-server", "VaadinService, VaadinSession, VaadinServlet, bootstrap, UIDL, request handling, push, StateNode, DOM, Element API"),
    ("flow-client", "client engine, Flow.ts, connection state, reconnect dialog, offline"),
    ("flow-data", "Binder, DataProvider, validation, converters, lazy loading"),
    ("flow-router", "@Route, RouterLink, navigation events, BeforeEnterObserver, route registry, layouts"),
    ("flow-build-tools", "frontend build, Vite, webpack, npm/pnpm install, TaskRunNpmInstall, node installer"),
    ("flow-dnd", "drag and drop, DragSource, DropTarget"),
    ("flow-polymer-template", "PolymerTemplate, template model, @Id binding"),
    ("flow-lit-template", "LitTemplate, lit element binding"),
    ("flow-maven-plugin", "prepare-frontend, build-frontend, maven goals"),
    ("flow-gradle-plugin", "vaadinPrepareFrontend, vaadinBuildFrontend, gradle"),
    ("vaadin-dev-server", "dev mode, dev tools, live reload, hotswap, theme editor"),
    ("vaadin-spring", "Spring Boot, SpringServlet, scopes, Spring Security integration"),
    ("signals", "signals, reactive state, ValueSignal, ListSignal"),
    ("theming", "@Theme, theme.json, CSS import, Lumo, styles"),
    ("pwa", "@PWA, service worker, manifest, offline page"),
    ("i18n", "I18NProvider, translations, locale"),
];

const GOOD_FIRST_ISSUE_RUBRIC: &str = "\
Mark good_first_issue true only when ALL hold:
- the problem is well described and reproducible, or the requested change is precise
- the fix is likely contained in one module and a handful of files
- no deep knowledge of the client/server communication protocol is needed
- there is no ongoing design discussion in the issue";

const TRIAGE_RUBRIC: &str = "\
For bugs only, fill the triage object (use null for other types):
- needs_test_case: no reproduction project or clear steps are provided
- ai_fixable: the fix is mechanical and well localized
- potentially_fixed: the description matches behaviour changed in later releases
- potentially_outdated: references versions or APIs that are no longer supported
- triage_notes: one or two sentences for the maintainer";

const SCHEMA: &str = r#"{
  "type": "bug" | "enhancement" | "feature request",
  "impact": "High" | "Low" | null,
  "severity": "Major" | "Minor" | null,
  "modules": ["<module name>", ...],
  "good_first_issue": true | false,
  "confidence": <number between 0 and 1>,
  "reasoning": "<one short sentence>",
  "triage": null | {
    "needs_test_case": bool,
    "ai_fixable": bool,
    "potentially_fixed": bool,
    "potentially_outdated": bool,
    "triage_notes": "<text>"
  }
}"#;

/// Build the classification prompt for one record.
pub fn build_prompt(record: &IssueRecord) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are triaging issues for the Vaadin Flow framework. Classify the issue below.\n\n",
    );

    prompt.push_str("## Modules\n");
    for (module, keywords) in MODULE_GLOSSARY {
        prompt.push_str(&format!("- {}: {}\n", module, keywords));
    }

    prompt.push_str("\n## Impact and severity (bugs only, null otherwise)\n");
    prompt.push_str("- impact High: affects many applications or blocks a common use case\n");
    prompt.push_str("- severity Major: crash, data loss, security problem or no workaround\n");

    prompt.push_str("\n## Good first issue\n");
    prompt.push_str(GOOD_FIRST_ISSUE_RUBRIC);
    prompt.push_str("\n\n## Triage\n");
    prompt.push_str(TRIAGE_RUBRIC);

    prompt.push_str("\n\n## Issue\n");
    prompt.push_str(&format!("Number: #{}\n", record.number));
    prompt.push_str(&format!("Title: {}\n", record.title));
    prompt.push_str(&format!("Author: {}\n", record.author));
    prompt.push_str(&format!("Age: {} days\n", record.age_days));
    prompt.push_str(&format!("Comments: {}\n", record.comment_count));
    let labels = if record.existing_labels.is_empty() {
        "(none)".to_string()
    } else {
        record.existing_labels.join(", ")
    };
    prompt.push_str(&format!("Existing labels: {}\n", labels));
    prompt.push_str(&format!("Body:\n{}\n", record.body_preview));

    prompt.push_str("\nRespond with a single JSON object and nothing else, shaped like:\n");
    prompt.push_str(SCHEMA);
    prompt.push('\n');
    prompt
}
