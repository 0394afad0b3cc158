use clap::Parser;
use image_builder::{
    render_dockerfile, render_dockerignore, BuildContext, ImageBuilder, ImageDescriptor,
    DOCKERFILE_NAME, DOCKERIGNORE_NAME,
};
use server::cli::{Cli, Commands};
use server::container::{
    detect_runtime, health_check_container, parse_env_assignment, start_container, RunConfig,
};
use server::health::probe;
use server::telemetry::init_tracing;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config()?;
            server::serve(config).await?;
        }
        Commands::Dockerfile { out, port } => {
            write_dockerfile(out.as_deref(), port)?;
        }
        Commands::Check { context } => {
            check_context(&context)?;
        }
        Commands::Build {
            context,
            tag,
            runtime,
        } => {
            build_image(&context, &tag, runtime)?;
        }
        Commands::Run {
            image,
            name,
            host_port,
            env,
            wait_secs,
        } => {
            run_container(image, name, host_port, &env, wait_secs).await?;
        }
        Commands::Health { url, timeout_secs } => {
            health_check(&url, timeout_secs).await?;
        }
    }

    Ok(())
}

fn write_dockerfile(out: Option<&Path>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = ImageDescriptor::default().with_port(port);
    let dockerfile = render_dockerfile(&descriptor)?;

    match out {
        Some(dir) => {
            std::fs::write(dir.join(DOCKERFILE_NAME), dockerfile)?;
            std::fs::write(dir.join(DOCKERIGNORE_NAME), render_dockerignore(&descriptor))?;
            println!("Wrote {} and {} to {}", DOCKERFILE_NAME, DOCKERIGNORE_NAME, dir.display());
        }
        None => print!("{}", dockerfile),
    }

    Ok(())
}

fn check_context(context: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let report = BuildContext::new(context).inspect(&ImageDescriptor::default())?;

    println!("Build context {} is ready.", context.display());
    if let Some(package) = &report.manifest.package {
        println!("Package: {}", package);
    }
    if !report.manifest.members.is_empty() {
        println!("Workspace members: {}", report.manifest.members.join(", "));
    }
    println!("Dependencies ({}):", report.dependencies.len());
    for dependency in &report.dependencies {
        println!("  - {}", dependency);
    }

    Ok(())
}

fn build_image(
    context: &Path,
    tag: &str,
    runtime: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = match runtime {
        Some(runtime) => runtime,
        None => {
            let detected = detect_runtime();
            if !detected.is_available() {
                return Err(server::ContainerError::NoRuntimeAvailable.into());
            }
            detected.command().to_string()
        }
    };

    let output = ImageBuilder::new(context, ImageDescriptor::default())
        .with_runtime(runtime)
        .with_tag(tag)
        .build()?;

    println!(
        "Built {} in {:.1}s ({} dependencies)",
        output.image,
        output.duration.as_secs_f64(),
        output.dependencies.len()
    );
    Ok(())
}

async fn run_container(
    image: String,
    name: String,
    host_port: u16,
    env: &[String],
    wait_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RunConfig::from_descriptor(&ImageDescriptor::default(), image)
        .with_container_name(name)
        .with_host_port(host_port)
        .with_health_timeout(Duration::from_secs(wait_secs));
    for raw in env {
        let (key, value) = parse_env_assignment(raw)?;
        config = config.with_env(key, value);
    }

    let runtime = detect_runtime();
    let handle = start_container(&runtime, &config)?;

    match health_check_container(&handle, &config).await {
        Ok(_) => {
            let port = handle.port;
            let name = handle.detach();
            println!("Container {} is running on http://127.0.0.1:{}", name, port);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "container did not become healthy");
            // Dropping the handle removes the container
            Err(e.into())
        }
    }
}

async fn health_check(url: &str, timeout_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    match probe(url, Duration::from_secs(timeout_secs)).await {
        Ok(report) => {
            println!(
                "✓ Healthy (version {}, up {}s)",
                report.version, report.uptime_seconds
            );
            info!("Health check successful");
            Ok(())
        }
        Err(e) => {
            println!("✗ Health check failed: {}", e);
            error!("Health check failed: {}", e);
            Err(e.into())
        }
    }
}
