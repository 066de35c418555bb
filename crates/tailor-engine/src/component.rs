//! New component creation and the emergency stub writer
//!
//! Pages are registered in the root composition file's route table.
//! Reusable components never touch that file.

use crate::error::{PatchError, ReplyError};
use crate::llm::{extract_code, normalize_generated_content, prompts};
use crate::patch::{check_source_size, PatchApplier};
use std::path::Path;
use tailor_adapters::{FsError, ProjectFs};
use tailor_core::heuristics::emergency_component_name;
use tailor_core::project::root_composition_file;
use tailor_core::routes::{has_route_table, insert_route, relative_import, route_path_for, verify_route_update};
use tailor_core::snapshot::contains_token;
use tailor_core::{parses_cleanly, ComponentType, FileMap, ProjectFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub component_type: ComponentType,
    pub request: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteUpdate {
    /// One route entry was added; `via_service` is false for the local insertion
    Applied { via_service: bool },
    Skipped(String),
    NotNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOutcome {
    /// Final component name, after making it unique
    pub name: String,
    pub generated_file: String,
    pub updated_files: Vec<String>,
    pub route_update: RouteUpdate,
}

/// Where a new file goes: `<src/>pages|components/<Name>.<ext>`, never over an
/// existing file.
fn placement(project: &ProjectFs, files: &FileMap, name: &str, component_type: ComponentType) -> (String, String) {
    let uses_src = project.root().join("src").is_dir() || files.keys().any(|path| path.starts_with("src/"));
    let dir = if uses_src {
        format!("src/{}", component_type.directory())
    } else {
        component_type.directory().to_string()
    };

    let extension = root_composition_file(files)
        .and_then(|root| Path::new(&root.relative_path).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| matches!(*ext, "tsx" | "jsx" | "js"))
        .map(str::to_string)
        .unwrap_or_else(|| {
            if files.keys().any(|path| path.ends_with(".tsx")) {
                "tsx".to_string()
            } else {
                "jsx".to_string()
            }
        });

    let taken = |path: &str| files.contains_key(path) || project.exists(path);
    let mut candidate = name.to_string();
    let mut suffix = 2;
    loop {
        let path = format!("{}/{}.{}", dir, candidate, extension);
        if !taken(&path) {
            return (path, candidate);
        }
        candidate = format!("{}{}", name, suffix);
        suffix += 1;
    }
}

fn insert_file(project: &ProjectFs, files: &mut FileMap, relative_path: &str, content: String) -> Result<(), FsError> {
    let absolute = project.write(relative_path, &content)?;
    let file = ProjectFile::new(project.root(), &absolute, content);
    files.insert(relative_path.to_string(), file);
    Ok(())
}

impl PatchApplier<'_> {
    /// Generate and write a new component; pages also get a route entry.
    pub async fn create_component(&self, files: &mut FileMap, spec: &ComponentSpec) -> Result<ComponentOutcome, PatchError> {
        let project = self.project();
        let (relative_path, name) = placement(project, files, &spec.name, spec.component_type);

        let style_sample = files
            .values()
            .find(|file| {
                file.file_type.is_source()
                    && file.relative_path.starts_with(relative_path.rsplit_once('/').map_or("", |(dir, _)| dir))
            })
            .or_else(|| root_composition_file(files))
            .map(|file| file.content.clone());

        let (max_output, temperature) = self.generation();
        let prompt = prompts::component_prompt(
            &name,
            spec.component_type,
            &relative_path,
            &spec.request,
            &spec.reasoning,
            style_sample.as_deref(),
        );
        let raw = self.service().complete(&prompt, max_output, temperature).await?;
        let code = extract_code(&raw)?;
        if !parses_cleanly(Path::new(&relative_path), &code) {
            return Err(PatchError::Unparseable(relative_path));
        }
        if !contains_token(&code, &name) {
            return Err(ReplyError::invalid_field("component", format!("does not define {}", name)).into());
        }

        let content = normalize_generated_content("", code, true);
        insert_file(project, files, &relative_path, content)?;
        tracing::info!(file = %relative_path, component = %name, kind = %spec.component_type, "component created");

        let route_update = match spec.component_type {
            ComponentType::Page => self.register_route(files, &name, &relative_path).await,
            ComponentType::Component => RouteUpdate::NotNeeded,
        };
        let updated_files = match (&route_update, root_composition_file(files)) {
            (RouteUpdate::Applied { .. }, Some(root)) => vec![root.relative_path.clone()],
            _ => Vec::new(),
        };

        Ok(ComponentOutcome {
            name,
            generated_file: relative_path,
            updated_files,
            route_update,
        })
    }

    /// Add one route for a new page, through the service first and the local
    /// insertion second. Both go through the same snapshot validation.
    async fn register_route(&self, files: &mut FileMap, name: &str, page_path: &str) -> RouteUpdate {
        let Some(root_path) = root_composition_file(files).map(|root| root.relative_path.clone()) else {
            tracing::info!(page = %page_path, "no root composition file; route not added");
            return RouteUpdate::Skipped("no root composition file".to_string());
        };
        let Some(root) = files.get_mut(&root_path) else {
            return RouteUpdate::Skipped("root composition file vanished".to_string());
        };
        if !has_route_table(&root.content) {
            tracing::info!(root = %root_path, "root file has no route table; route not added");
            return RouteUpdate::Skipped(format!("{} has no route table", root_path));
        }

        let import_path = relative_import(&root_path, page_path);
        let route_path = route_path_for(name);

        let from_service = self
            .route_update_from_service(&root_path, &root.content, name, &import_path, &route_path)
            .await;
        let via_service = from_service.and_then(|updated| self.commit(root, updated));

        match via_service {
            Ok(_) => return RouteUpdate::Applied { via_service: true },
            Err(err) => tracing::warn!(root = %root_path, error = %err, "route update from service rejected; inserting locally"),
        }

        let Some(updated) = insert_route(&root.content, name, &import_path, &route_path) else {
            return RouteUpdate::Skipped(format!("could not place a route in {}", root_path));
        };
        let local = verify_route_update(&root.content, &updated, name)
            .map_err(PatchError::from)
            .and_then(|()| self.commit(root, updated));
        match local {
            Ok(_) => RouteUpdate::Applied { via_service: false },
            Err(err) => {
                tracing::warn!(root = %root_path, error = %err, "local route insertion rejected");
                RouteUpdate::Skipped(err.to_string())
            }
        }
    }

    async fn route_update_from_service(
        &self,
        root_path: &str,
        root_content: &str,
        name: &str,
        import_path: &str,
        route_path: &str,
    ) -> Result<String, PatchError> {
        check_source_size(root_path, root_content.len())?;
        let (max_output, temperature) = self.generation();
        let prompt = prompts::route_update_prompt(root_path, root_content, name, import_path, route_path);
        let raw = self.service().complete(&prompt, max_output, temperature).await?;
        let updated = extract_code(&raw)?;
        verify_route_update(root_content, &updated, name)?;
        Ok(updated)
    }
}

/// Write a fixed-template component named from the request's plain words.
///
/// No reasoning service involved. Returns the created path.
pub fn write_emergency_stub(project: &ProjectFs, files: &mut FileMap, request: &str) -> Result<String, PatchError> {
    if !project.root().is_dir() {
        return Err(FsError::io(
            project.root(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "project root is not a directory"),
        )
        .into());
    }

    let base = emergency_component_name(request);
    let (relative_path, name) = placement(project, files, &base, ComponentType::Component);
    let quoted_request = serde_json::to_string(request.trim()).unwrap_or_else(|_| "\"\"".to_string());
    let class_name = route_path_for(&name).trim_start_matches('/').to_string();

    let content = format!(
        r#"import React from 'react';

export default function {name}() {{
  return (
    <section className="{class_name}">
      <h2>{name}</h2>
      <p>{{{quoted_request}}}</p>
    </section>
  );
}}
"#
    );

    insert_file(project, files, &relative_path, content)?;
    tracing::info!(file = %relative_path, component = %name, "emergency stub written");
    Ok(relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedService;
    use std::fs;
    use tailor_adapters::PathPolicy;
    use tailor_core::routes::route_lines;

    const APP: &str = r#"import React from 'react';
import { BrowserRouter, Routes, Route } from 'react-router-dom';
import Home from './pages/Home';

export default function App() {
  return (
    <BrowserRouter>
      <Routes>
        <Route path="/" element={<Home />} />
      </Routes>
    </BrowserRouter>
  );
}
"#;

    const ABOUT: &str = "```tsx\nimport React from 'react';\n\nexport default function About() {\n  return <h1>About us</h1>;\n}\n```";

    fn project() -> (tempfile::TempDir, ProjectFs, FileMap) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/pages")).unwrap();
        fs::write(dir.path().join("src/App.tsx"), APP).unwrap();
        fs::write(
            dir.path().join("src/pages/Home.tsx"),
            "export default function Home() {\n  return <h1>Home</h1>;\n}\n",
        )
        .unwrap();
        let project = ProjectFs::new(dir.path(), PathPolicy::Confined);
        let files = project.scan().unwrap();
        (dir, project, files)
    }

    fn spec(name: &str, component_type: ComponentType) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            component_type,
            request: format!("add a new {} {}", name, component_type),
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn page_creation_adds_exactly_one_route() {
        let (dir, project, mut files) = project();
        let service = ScriptedService::new().on(prompts::COMPONENT_TASK, ABOUT);
        let applier = PatchApplier::new(&service, &project, 2048, 0.2);

        let outcome = applier.create_component(&mut files, &spec("About", ComponentType::Page)).await.unwrap();
        assert_eq!(outcome.generated_file, "src/pages/About.tsx");
        assert_eq!(outcome.updated_files, vec!["src/App.tsx"]);
        // No scripted route reply: the local insertion takes over.
        assert_eq!(outcome.route_update, RouteUpdate::Applied { via_service: false });

        let app = fs::read_to_string(dir.path().join("src/App.tsx")).unwrap();
        let routes = route_lines(&app);
        assert_eq!(routes.len(), 2);
        assert!(routes.contains(&r#"<Route path="/" element={<Home />} />"#.to_string()));
        assert!(app.contains("import About from './pages/About';"));
        assert!(files.contains_key("src/pages/About.tsx"));
        assert_eq!(files["src/App.tsx"].content, app);
    }

    #[tokio::test]
    async fn service_route_update_is_used_when_valid() {
        let (dir, project, mut files) = project();
        let updated_app = APP
            .replace(
                "import Home from './pages/Home';",
                "import Home from './pages/Home';\nimport About from './pages/About';",
            )
            .replace(
                "        <Route path=\"/\" element={<Home />} />",
                "        <Route path=\"/\" element={<Home />} />\n        <Route path=\"/about\" element={<About />} />",
            );
        let service = ScriptedService::new()
            .on(prompts::COMPONENT_TASK, ABOUT)
            .on(prompts::ROUTE_UPDATE_TASK, format!("```tsx\n{}```", updated_app));
        let applier = PatchApplier::new(&service, &project, 2048, 0.2);

        let outcome = applier.create_component(&mut files, &spec("About", ComponentType::Page)).await.unwrap();
        assert_eq!(outcome.route_update, RouteUpdate::Applied { via_service: true });
        assert_eq!(fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(), updated_app);
    }

    #[tokio::test]
    async fn route_update_dropping_a_route_is_rejected() {
        let (dir, project, mut files) = project();
        let broken = APP.replace("<Route path=\"/\" element={<Home />} />", "<Route path=\"/about\" element={<About />} />");
        let service = ScriptedService::new()
            .on(prompts::COMPONENT_TASK, ABOUT)
            .on(prompts::ROUTE_UPDATE_TASK, format!("```tsx\n{}```", broken));
        let applier = PatchApplier::new(&service, &project, 2048, 0.2);

        let outcome = applier.create_component(&mut files, &spec("About", ComponentType::Page)).await.unwrap();
        assert_eq!(outcome.route_update, RouteUpdate::Applied { via_service: false });
        let app = fs::read_to_string(dir.path().join("src/App.tsx")).unwrap();
        assert_eq!(route_lines(&app).len(), 2);
    }

    #[tokio::test]
    async fn reusable_components_never_touch_the_root_file() {
        let (dir, project, mut files) = project();
        let service = ScriptedService::new().on(
            prompts::COMPONENT_TASK,
            "```tsx\nexport default function PricingCard() {\n  return <div>Pro</div>;\n}\n```",
        );
        let applier = PatchApplier::new(&service, &project, 2048, 0.2);

        let outcome = applier
            .create_component(&mut files, &spec("PricingCard", ComponentType::Component))
            .await
            .unwrap();
        assert_eq!(outcome.generated_file, "src/components/PricingCard.tsx");
        assert!(outcome.updated_files.is_empty());
        assert_eq!(outcome.route_update, RouteUpdate::NotNeeded);
        assert_eq!(service.calls_for(prompts::ROUTE_UPDATE_TASK), 0);
        assert_eq!(fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(), APP);
    }

    #[tokio::test]
    async fn existing_files_are_never_overwritten() {
        let (_dir, project, mut files) = project();
        let service = ScriptedService::new()
            .on_matching(prompts::COMPONENT_TASK, "named Home2", "```tsx\nexport default function Home2() {\n  return <p />;\n}\n```");
        let applier = PatchApplier::new(&service, &project, 2048, 0.2);

        let outcome = applier.create_component(&mut files, &spec("Home", ComponentType::Page)).await.unwrap();
        assert_eq!(outcome.name, "Home2");
        assert_eq!(outcome.generated_file, "src/pages/Home2.tsx");
    }

    #[tokio::test]
    async fn unusable_generation_writes_nothing() {
        let (dir, project, mut files) = project();
        let service = ScriptedService::new().on(prompts::COMPONENT_TASK, "```tsx\nexport default function () {\n```");
        let applier = PatchApplier::new(&service, &project, 2048, 0.2);

        assert!(applier.create_component(&mut files, &spec("About", ComponentType::Page)).await.is_err());
        assert!(!dir.path().join("src/pages/About.tsx").exists());
        assert_eq!(fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(), APP);
    }

    #[test]
    fn emergency_stub_embeds_the_request_safely() {
        let (dir, project, mut files) = project();
        let path = write_emergency_stub(&project, &mut files, "add a \"pricing\" table </p>").unwrap();
        assert_eq!(path, "src/components/PricingTable.tsx");
        let stub = fs::read_to_string(dir.path().join(&path)).unwrap();
        assert!(stub.contains("export default function PricingTable()"));
        assert!(stub.contains(r#"<p>{"add a \"pricing\" table </p>"}</p>"#));
        assert!(parses_cleanly(Path::new(&path), &stub));
    }

    #[test]
    fn emergency_stub_reports_a_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectFs::new(dir.path().join("missing"), PathPolicy::Confined);
        assert!(write_emergency_stub(&project, &mut FileMap::new(), "anything").is_err());
    }
}
