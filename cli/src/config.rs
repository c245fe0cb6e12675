use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use engine::{
    DEFAULT_CONCURRENCY, Error, ImgModBox, image_model::ReplicateImageModel,
    image_model::models::DEFAULT_MODEL, work::RunOptions,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::cli::GlobalArgs;

pub const CONFIG_FILE_NAME: &str = "replicate_images.ron";
pub const DEFAULT_OUTPUT_DIR: &str = "./generated-images";

/// Persisted user settings. Every field is optional; command line flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

pub fn load_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let src = fs::read_to_string(path)?;
    Ok(ron::from_str(&src)?)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join(CONFIG_FILE_NAME))
}

pub fn load_config() -> Result<Option<Config>> {
    let path = config_path()?;
    if !path.exists() {
        Ok(None)
    } else {
        load_ron_file(&path)
            .map(Some)
            .wrap_err_with(|| format!("Couldn't load config from {}", path.display()))
    }
}

/// The configuration one command runs with, after merging flags, environment and file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_token: Option<String>,
    pub model: String,
    pub options: RunOptions,
}

impl Settings {
    pub fn resolve(
        global: &GlobalArgs,
        config: Config,
        model: Option<String>,
        concurrency: Option<usize>,
    ) -> Result<Self> {
        let concurrency = concurrency
            .or(config.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(Error::InvalidInput("concurrency must be at least 1".into()).into());
        }

        let output_dir = global
            .output
            .clone()
            .or(config.output_dir)
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into());

        Ok(Self {
            api_token: global.api_token.clone().or(config.api_token),
            model: model
                .or(config.default_model)
                .unwrap_or_else(|| DEFAULT_MODEL.into()),
            options: RunOptions {
                concurrency,
                use_cache: !global.no_cache,
                ..RunOptions::new(output_dir)
            },
        })
    }

    pub fn has_token(&self) -> bool {
        self.api_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn replicate_client(&self) -> Result<ReplicateImageModel> {
        let token = self.api_token.clone().filter(|t| !t.is_empty()).ok_or(eyre!(
            "No Replicate API token. Set REPLICATE_API_TOKEN, pass --api-token or add api_token to {CONFIG_FILE_NAME}"
        ))?;
        Ok(ReplicateImageModel::new(token))
    }

    pub fn image_model(&self) -> Result<ImgModBox> {
        Ok(Box::new(self.replicate_client()?))
    }

    /// RON rendering for `config show`, with the token masked.
    pub fn display_config(&self) -> Result<String> {
        let shown = Config {
            api_token: self.api_token.as_deref().map(mask),
            default_model: Some(self.model.clone()),
            output_dir: Some(self.options.output_dir.clone()),
            concurrency: Some(self.options.concurrency),
        };
        Ok(ron::ser::to_string_pretty(
            &shown,
            ron::ser::PrettyConfig::default(),
        )?)
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}…")
}
