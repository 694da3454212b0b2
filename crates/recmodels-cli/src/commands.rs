//! Subcommand implementations.

use crate::Command;
use anyhow::{Context as _, Result};
use recmodels_core::config::IndexConfig;
use recmodels_core::{
    CoordinateCatalog, DependencyInfo, DependencyType, ModelArchiveCoordinateAdvisor,
    ModelArchiveRepository, ModelCoordinate, ModelServices, ModelsSettings, ProjectCoordinate,
    ProjectCoordinateResolver,
};
use std::path::{Path, PathBuf};
use tracing::info;

const SETTINGS_FILE: &str = "settings.json";

pub struct Context {
    pub basedir: PathBuf,
    pub remote: Option<String>,
}

impl Context {
    fn settings_path(&self) -> PathBuf {
        self.basedir.join(SETTINGS_FILE)
    }

    fn services(&self) -> Result<ModelServices> {
        let settings = ModelsSettings::load(&self.settings_path())?;
        let mut builder = ModelServices::builder(&self.basedir)
            .settings(settings)
            .auto_create_dirs(true);
        if let Some(remote) = &self.remote {
            builder = builder.remote_url(remote.clone());
        }
        Ok(builder.build()?)
    }

    /// Services with the index open, downloading it on first use.
    async fn open_services(&self) -> Result<ModelServices> {
        let services = self.services()?;
        services
            .open()
            .await
            .context("Failed to open the model index")?;
        Ok(services)
    }
}

pub async fn run(context: &Context, command: Command) -> Result<()> {
    match command {
        Command::Resolve { coordinate, force } => {
            let mc = ModelCoordinate::value_of(&coordinate)?;
            let services = context.services()?;
            let path = services.repository().resolve(&mc, force).await?;
            println!("{}", path.display());
        }
        Command::Suggest {
            project,
            model_type,
        } => {
            let pc = ProjectCoordinate::value_of(&project)?;
            let services = context.open_services().await?;
            match services.index().suggest(&pc, &model_type) {
                Some(mc) => println!("{}", mc),
                None => println!("No {} model for {}", model_type, pc),
            }
            services.close()?;
        }
        Command::Candidates {
            project,
            model_type,
        } => {
            let pc = ProjectCoordinate::value_of(&project)?;
            let services = context.open_services().await?;
            for mc in services.index().suggest_candidates(&pc, &model_type) {
                println!("{}", mc);
            }
            services.close()?;
        }
        Command::MapJar { path } => {
            let jar = absolute(&path)?;
            let dependency = DependencyInfo::new(jar, DependencyType::Jar)?;
            let services = context.open_services().await?;
            match services.mapping().search_for_project_coordinate(&dependency) {
                Some(pc) => println!("{}", pc),
                None => println!("Unknown project for {}", path.display()),
            }
            services.close()?;
        }
        Command::BuildIndex { json, out_dir } => {
            let db = out_dir.join(IndexConfig::CATALOG_FILE_NAME);
            let count = CoordinateCatalog::import_json(&json, &db)
                .with_context(|| format!("Failed to build catalog from {}", json.display()))?;
            info!("Wrote {} projects to {}", count, db.display());
            println!("{}", db.display());
        }
        Command::UpdateIndex => {
            let services = context.services()?;
            services.update_index().await?;
            println!("{}", services.index_dir().display());
            services.close()?;
        }
        Command::ListLocal => {
            let services = context.services()?;
            for archive in services.repository().local_archives() {
                println!("{}", archive.display());
            }
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("No such file: {}", path.display()))
}
