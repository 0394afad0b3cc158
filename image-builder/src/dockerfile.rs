//! Rendering of `Dockerfile` and `.dockerignore` from an [`ImageDescriptor`].
//!
//! The output is a two-stage build: the first stage fetches the locked
//! dependency set and compiles the binary, the second stage contains only
//! the binary on top of the runtime base image.

use crate::descriptor::{EnvVar, ImageDescriptor};
use crate::ImageBuilderResult;

pub const DOCKERFILE_NAME: &str = "Dockerfile";
pub const DOCKERIGNORE_NAME: &str = ".dockerignore";

const BUILDER_STAGE: &str = "builder";

/// JSON array form used by `CMD` and `HEALTHCHECK` so no shell is involved
fn exec_form(argv: &[String]) -> String {
    let quoted: Vec<String> = argv.iter().map(|arg| quote(arg)).collect();
    format!("[{}]", quoted.join(", "))
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn env_value(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:,".contains(c));
    if plain {
        value.to_string()
    } else {
        quote(value)
    }
}

/// Renders the Dockerfile text. The descriptor is validated first.
pub fn render_dockerfile(descriptor: &ImageDescriptor) -> ImageBuilderResult<String> {
    descriptor.validate()?;

    let workdir = descriptor.workdir.trim_end_matches('/');
    let locked = if descriptor.lockfile.is_some() {
        " --locked"
    } else {
        ""
    };

    let mut lines = vec![
        "# syntax=docker/dockerfile:1".to_string(),
        String::new(),
        format!("FROM {} AS {}", descriptor.builder_image, BUILDER_STAGE),
        format!("WORKDIR {}", workdir),
    ];

    let mut manifest_files = vec![descriptor.manifest.as_str()];
    if let Some(lockfile) = &descriptor.lockfile {
        manifest_files.push(lockfile);
    }
    lines.push(format!("COPY {} ./", manifest_files.join(" ")));

    for entry in &descriptor.include {
        let entry = entry.trim_end_matches('/');
        lines.push(format!("COPY {} ./{}", entry, entry));
    }

    lines.push(format!("RUN cargo fetch{}", locked));
    lines.push(format!(
        "RUN cargo build --release{} --bin {}",
        locked, descriptor.binary
    ));

    lines.push(String::new());
    lines.push(format!("FROM {}", descriptor.base_image));
    lines.push(format!("WORKDIR {}", workdir));
    lines.push(format!(
        "COPY --from={} {}/target/release/{} /usr/local/bin/{}",
        BUILDER_STAGE, workdir, descriptor.binary, descriptor.binary
    ));

    if let Some(user) = &descriptor.user {
        lines.push(format!("USER {}", user));
    }

    lines.push(format!("EXPOSE {}", descriptor.exposed_port));

    for var in &descriptor.env {
        match var {
            EnvVar::Static { name, value } => {
                lines.push(format!("ENV {}={}", name, env_value(value)));
            }
            EnvVar::Secret { name } => {
                lines.push(format!("# {} must be provided at container start", name));
            }
        }
    }

    if let (Some(check), Some(url)) = (&descriptor.health_check, descriptor.health_url()) {
        let probe = vec![
            descriptor.binary.clone(),
            "health".to_string(),
            "--url".to_string(),
            url,
        ];
        lines.push(format!(
            "HEALTHCHECK --interval={}s --timeout={}s --retries={} CMD {}",
            check.interval.as_secs(),
            check.timeout.as_secs(),
            check.retries,
            exec_form(&probe)
        ));
    }

    lines.push(format!("CMD {}", exec_form(&descriptor.entrypoint.argv())));

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

/// Renders `.dockerignore`, one exclude pattern per line.
pub fn render_dockerignore(descriptor: &ImageDescriptor) -> String {
    let mut text = String::new();
    for pattern in &descriptor.exclude {
        text.push_str(pattern);
        text.push('\n');
    }
    text
}
