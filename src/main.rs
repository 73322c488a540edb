mod script;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sketchsync_core::{deserialize, serialize, Scene, SceneId, Shape, Template};
use sketchsync_session::{EditorSession, SessionConfig, DEFAULT_HISTORY_CAPACITY};
use sketchsync_sync::{
    default_store_dir, Document, DocumentStore, FileStore, HeadlessSurface, RenderSurface,
    SyncConfig, DEFAULT_DEBOUNCE,
};
use tracing_subscriber::EnvFilter;

/// Shared drawing scenes with undo history and store sync
#[derive(Parser, Debug)]
#[command(name = "sketchsync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding stored scenes
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Quiet period before edits are saved, in milliseconds
    #[arg(long, global = true, value_name = "MS", default_value_t = DEFAULT_DEBOUNCE.as_millis() as u64)]
    debounce_ms: u64,

    /// Number of undo steps kept
    #[arg(long, global = true, value_name = "N", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a scene and print its id
    New {
        /// Starting content (see `templates`)
        #[arg(long, default_value = "blank")]
        template: Template,
    },

    /// List the available templates
    Templates,

    /// Print a stored scene
    Show {
        scene: SceneId,
    },

    /// Edit a scene by running a script in a headless session
    Edit {
        scene: SceneId,

        /// Starting content if the scene was never saved
        #[arg(long, default_value = "blank")]
        template: Template,

        /// Script to run, `-` for stdin
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let store_dir = args.store.clone().unwrap_or_else(default_store_dir);

    match args.command {
        Command::New { template } => {
            let store = FileStore::open(&store_dir)
                .await
                .with_context(|| format!("opening store at {}", store_dir.display()))?;
            let scene = create_scene(&store, template).await?;
            println!("{scene}");
        }
        Command::Templates => {
            for template in Template::ALL {
                println!("{:<14} {:<14} {}", template.id(), template.name(), template.description());
            }
        }
        Command::Show { scene } => {
            let store = FileStore::open(&store_dir)
                .await
                .with_context(|| format!("opening store at {}", store_dir.display()))?;
            let document = store
                .get(&scene)
                .await
                .with_context(|| format!("reading scene {scene}"))?
                .with_context(|| format!("scene {scene} not found in {}", store_dir.display()))?;
            let content = deserialize(&document.payload)
                .with_context(|| format!("scene {scene} is corrupt"))?;
            println!("scene {scene} (updated {})", document.updated_at.to_rfc3339());
            for line in describe_scene(&content) {
                println!("{line}");
            }
        }
        Command::Edit {
            scene,
            template,
            script: script_path,
        } => {
            let source = match &script_path {
                Some(path) => Some(read_script(path)?),
                None => None,
            };
            let lines = match &source {
                Some(source) => script::parse(source).context("invalid script")?,
                None => Vec::new(),
            };

            let store = FileStore::open(&store_dir)
                .await
                .with_context(|| format!("opening store at {}", store_dir.display()))?;
            let surface = Arc::new(HeadlessSurface::new());
            let config = SessionConfig::new()
                .with_history_capacity(args.history)
                .with_template(template)
                .with_sync(SyncConfig::new().with_debounce(Duration::from_millis(args.debounce_ms)));

            let session = EditorSession::open(scene.clone(), Arc::new(store), surface.clone(), config)
                .await
                .with_context(|| format!("opening scene {scene}"))?;
            let summary = script::run(&session, &surface, &lines).await;
            session.flush().await.context("saving scene")?;

            println!(
                "scene {scene}: {} objects, history {}/{} ({} commands run, {} skipped)",
                surface.capture().len(),
                session.cursor() + 1,
                session.history_len(),
                summary.executed,
                summary.skipped,
            );
            session.close();
        }
    }

    Ok(())
}

/// Store a new scene seeded from `template`
async fn create_scene(store: &dyn DocumentStore, template: Template) -> Result<SceneId> {
    let scene = SceneId::generate();
    let payload = serialize(&template.scene());
    store
        .set(&scene, Document::new(payload))
        .await
        .with_context(|| format!("saving new scene {scene}"))?;
    Ok(scene)
}

fn read_script(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading script from stdin")
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading script {}", path.display()))
    }
}

/// One line for the background, then one per shape
fn describe_scene(scene: &Scene) -> Vec<String> {
    let mut lines = vec![format!("background {}", scene.background)];
    lines.extend(
        scene
            .objects
            .iter()
            .enumerate()
            .map(|(index, shape)| format!("{index:>4}  {}", describe_shape(shape))),
    );
    lines
}

fn describe_shape(shape: &Shape) -> String {
    let coord = |key: &str| shape.get(key).and_then(|v| v.as_f64());
    let mut out = shape.kind.to_string();
    if let (Some(left), Some(top)) = (coord("left"), coord("top")) {
        out.push_str(&format!(" at ({left}, {top})"));
    }
    if let Some(text) = shape.get("text").and_then(|v| v.as_str()) {
        out.push_str(&format!(" {text:?}"));
    }
    if let Some(fill) = shape.get("fill").and_then(|v| v.as_str()) {
        out.push_str(&format!(" fill {fill}"));
    }
    if shape.is_locked() {
        out.push_str(" [locked]");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_flags() {
        let args = Args::try_parse_from([
            "sketchsync",
            "edit",
            "my-scene",
            "--template",
            "diagram",
            "--debounce-ms",
            "50",
            "--history",
            "10",
        ])
        .unwrap();
        assert_eq!(args.debounce_ms, 50);
        assert_eq!(args.history, 10);
        let Command::Edit { scene, template, script } = args.command else {
            panic!("expected edit");
        };
        assert_eq!(scene.as_str(), "my-scene");
        assert_eq!(template, Template::Diagram);
        assert!(script.is_none());

        assert!(Args::try_parse_from(["sketchsync", "show", "bad id"]).is_err());
        assert!(Args::try_parse_from(["sketchsync", "new", "--template", "poster"]).is_err());
    }

    #[test]
    fn describes_shapes() {
        let mut scene = Scene::new();
        scene.push(Shape::rect(1.0, 2.0, 3.0, 4.0, "#ff0000").locked());
        scene.push(Shape::text(0.0, 0.0, "Hi", 12.0, "#000000"));
        assert_eq!(
            describe_scene(&scene),
            vec![
                "background #ffffff".to_string(),
                "   0  rect at (1, 2) fill #ff0000 [locked]".to_string(),
                "   1  text at (0, 0) \"Hi\" fill #000000".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn new_scene_is_stored_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let scene = create_scene(&store, Template::Presentation).await.unwrap();

        let document = store.get(&scene).await.unwrap().unwrap();
        assert_eq!(deserialize(&document.payload).unwrap(), Template::Presentation.scene());
    }
}
