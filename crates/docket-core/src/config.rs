use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const RC_ENV_VAR: &str = "DOCKETRC";
pub const AUTH_TOKEN_PREFIX: &str =
  "auth.token.";
pub const JWT_SECRET_KEY: &str =
  "auth.jwt_secret";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("server.bind", "127.0.0.1:5000"),
      ("data.location", "~/.docket"),
      ("store", "jsonl"),
      ("timezone", "UTC"),
      ("calendar.cell_limit", "3"),
      ("auth.token_ttl_days", "7"),
      (
        "cors.origins",
        "http://localhost:5173"
      ),
      (
        "weather.base_url",
        "https://api.openweathermap.org"
      )
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(docketrc = %path.display(), "loading docketrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no docketrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      if is_secret_key(&key) {
        debug!(key = %key, "applying override");
      } else {
        debug!(key = %key, value = %v, "applying override");
      }
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Parses a value, naming the key in
  /// the error.
  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: FromStr,
    T::Err: std::fmt::Display
  {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|err| {
        anyhow!(
          "invalid value for {key}: \
           {raw} ({err})"
        )
      })
  }

  /// Comma-separated list, blanks
  /// dropped.
  pub fn get_list(
    &self,
    key: &str
  ) -> Vec<String> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw
          .split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }

  /// `(owner, token)` pairs from
  /// `auth.token.<owner> = <token>`.
  pub fn auth_tokens(
    &self
  ) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> =
      self
        .map
        .iter()
        .filter_map(|(k, v)| {
          let owner = k.strip_prefix(
            AUTH_TOKEN_PREFIX
          )?;
          let token = v.trim();
          (!owner.is_empty()
            && !token.is_empty())
          .then(|| {
            (
              owner.to_string(),
              token.to_string()
            )
          })
        })
        .collect();
    out.sort();
    out
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = match raw_line
        .split_once('#')
      {
        | Some((before, _)) => {
          before.trim()
        }
        | None => raw_line.trim()
      };
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

fn is_secret_key(
  key: &str
) -> bool {
  key.starts_with(AUTH_TOKEN_PREFIX)
    || key == JWT_SECRET_KEY
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate = home.join(".docketrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".docket"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
