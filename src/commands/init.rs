//! Scaffold the build recipe and dependency manifest for the sensor API.

use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DeployConfig;
use crate::ui;

const REQUIREMENTS: &str = "\
fastapi>=0.110
uvicorn[standard]>=0.29
sqlalchemy>=2.0
pydantic>=2.0
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Overwritten,
    Kept,
}

pub fn run(config: &DeployConfig, force: bool) -> Result<()> {
    ui::header(&format!("Scaffolding {}", config.context.display()));

    for (path, outcome) in scaffold(config, force)? {
        let shown = path.display();
        match outcome {
            Outcome::Created => ui::success(&format!("Created {shown}")),
            Outcome::Overwritten => ui::success(&format!("Overwrote {shown}")),
            Outcome::Kept => ui::dim(&format!("{shown} exists, kept (use --force to overwrite)")),
        }
    }

    let entrypoint = config.context.join(&config.entrypoint);
    if !entrypoint.is_file() {
        ui::warn(&format!(
            "{} not found; add the API before deploying",
            entrypoint.display()
        ));
    }
    Ok(())
}

/// Write the Dockerfile and requirements file into the build context.
pub fn scaffold(config: &DeployConfig, force: bool) -> Result<Vec<(PathBuf, Outcome)>> {
    fs::create_dir_all(&config.context)
        .with_context(|| format!("Failed to create {}", config.context.display()))?;

    let files = [
        (config.context.join(&config.dockerfile), dockerfile(config)),
        (
            config.context.join(&config.requirements),
            REQUIREMENTS.to_string(),
        ),
    ];

    files
        .into_iter()
        .map(|(path, contents)| {
            let outcome = write_file(&path, &contents, force)?;
            Ok((path, outcome))
        })
        .collect()
}

fn write_file(path: &Path, contents: &str, force: bool) -> Result<Outcome> {
    let outcome = match (path.exists(), force) {
        (false, _) => Outcome::Created,
        (true, true) => Outcome::Overwritten,
        (true, false) => return Ok(Outcome::Kept),
    };
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(outcome)
}

/// Recipe: install dependencies, copy the entry file, run as a non-root
/// user with the data directory owned by it, serve with uvicorn.
pub fn dockerfile(config: &DeployConfig) -> String {
    let module = Path::new(&config.entrypoint)
        .file_stem()
        .map_or_else(|| "main".to_string(), |s| s.to_string_lossy().into_owned());
    let port = config.container_port;

    format!(
        r#"FROM python:3.11-slim

WORKDIR /app

COPY {requirements} .
RUN pip install --no-cache-dir -r {requirements}

COPY {entrypoint} .

RUN useradd --create-home --uid 1000 appuser \
    && mkdir -p {data} \
    && chown -R appuser:appuser /app {data}
USER appuser

EXPOSE {port}

CMD ["uvicorn", "{module}:app", "--host", "0.0.0.0", "--port", "{port}"]
"#,
        requirements = config.requirements,
        entrypoint = config.entrypoint,
        data = config.data_mount,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> DeployConfig {
        DeployConfig {
            context: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_dockerfile_contract() {
        let text = dockerfile(&DeployConfig::default());
        assert!(text.contains("pip install --no-cache-dir -r requirements.txt"));
        assert!(text.contains("COPY main.py ."));
        assert!(text.contains("mkdir -p /app/data"));
        assert!(text.contains("USER appuser"));
        assert!(text.contains("EXPOSE 8000"));
        assert!(text.contains(r#"CMD ["uvicorn", "main:app", "--host", "0.0.0.0", "--port", "8000"]"#));
    }

    #[test]
    fn test_dockerfile_follows_config() {
        let config = DeployConfig {
            entrypoint: "server.py".to_string(),
            container_port: 9000,
            ..Default::default()
        };
        let text = dockerfile(&config);
        assert!(text.contains("COPY server.py ."));
        assert!(text.contains(r#""server:app""#));
        assert!(text.contains(r#""--port", "9000""#));
    }

    #[test]
    fn test_scaffold_creates_missing_files() {
        let tmp = TempDir::new().unwrap();
        let context = tmp.path().join("api");
        let config = config_in(&context);

        let outcomes = scaffold(&config, false).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| *o == Outcome::Created));
        let requirements = fs::read_to_string(context.join("requirements.txt")).unwrap();
        assert!(requirements.contains("fastapi"));
        assert!(requirements.contains("sqlalchemy"));
    }

    #[test]
    fn test_scaffold_keeps_existing_without_force() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("Dockerfile"), "FROM custom\n").unwrap();
        let config = config_in(tmp.path());

        let outcomes = scaffold(&config, false).unwrap();
        assert_eq!(outcomes[0].1, Outcome::Kept);
        assert_eq!(outcomes[1].1, Outcome::Created);
        assert_eq!(
            fs::read_to_string(tmp.path().join("Dockerfile")).unwrap(),
            "FROM custom\n"
        );

        let outcomes = scaffold(&config, true).unwrap();
        assert!(outcomes.iter().all(|(_, o)| *o == Outcome::Overwritten));
        assert!(
            fs::read_to_string(tmp.path().join("Dockerfile"))
                .unwrap()
                .starts_with("FROM python")
        );
    }
}
