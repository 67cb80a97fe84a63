mod common;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use bio_exec::{
    BackendResource, ExecutionMode, ModeRegistry, ResolveError, SettingsLayer, ToolRunner,
};
use common::{ScriptedProbe, settings_with};

fn runner(layer: SettingsLayer, probe: Arc<ScriptedProbe>) -> ToolRunner {
    let settings = settings_with(layer);
    let registry = ModeRegistry::from_settings(&settings);
    ToolRunner::with_probe(settings, registry, probe)
}

fn prefer(modes: &[ExecutionMode]) -> SettingsLayer {
    SettingsLayer {
        preferred_modes: Some(modes.to_vec()),
        ..SettingsLayer::default()
    }
}

#[tokio::test]
async fn native_binary_on_path_wins_over_docker() -> Result<()> {
    let probe = Arc::new(
        ScriptedProbe::new()
            .native("/opt/blast/bin/blastn")
            .container(ExecutionMode::Docker, "/usr/bin/docker", "biocontainers/blast:2.15.0"),
    );
    let runner = runner(
        prefer(&[ExecutionMode::Native, ExecutionMode::Docker]),
        probe.clone(),
    );

    let plan = runner.resolve("blast").await?;
    assert_eq!(plan.mode, ExecutionMode::Native);
    assert_eq!(
        plan.resource,
        BackendResource::Binary {
            path: PathBuf::from("/opt/blast/bin/blastn")
        }
    );
    // Probing stops at the first available mode.
    assert_eq!(probe.calls(ExecutionMode::Docker), 0);
    Ok(())
}

#[tokio::test]
async fn falls_back_to_docker_when_native_is_missing() -> Result<()> {
    let probe = Arc::new(ScriptedProbe::new().container(
        ExecutionMode::Docker,
        "/usr/bin/docker",
        "biocontainers/blast:2.15.0",
    ));
    let runner = runner(prefer(&[ExecutionMode::Native, ExecutionMode::Docker]), probe);

    let plan = runner.resolve("blast").await?;
    assert_eq!(plan.mode, ExecutionMode::Docker);
    match plan.resource {
        BackendResource::Container { image, .. } => {
            assert_eq!(image, "biocontainers/blast:2.15.0")
        }
        other => panic!("expected container resource, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn higher_preference_wins_when_several_modes_are_available() -> Result<()> {
    let probe = Arc::new(
        ScriptedProbe::new()
            .native("/usr/bin/samtools")
            .module(&["samtools"])
            .container(ExecutionMode::Docker, "/usr/bin/docker", "biocontainers/samtools"),
    );
    let runner = runner(
        prefer(&[ExecutionMode::Docker, ExecutionMode::Module, ExecutionMode::Native]),
        probe,
    );
    assert_eq!(runner.resolve("samtools").await?.mode, ExecutionMode::Docker);
    Ok(())
}

#[tokio::test]
async fn forced_mode_is_never_substituted() -> Result<()> {
    let probe = Arc::new(
        ScriptedProbe::new()
            .native("/usr/bin/blastn")
            .container(ExecutionMode::Docker, "/usr/bin/docker", "biocontainers/blast:2.15.0"),
    );
    let runner = runner(
        SettingsLayer {
            execution_mode: Some(ExecutionMode::Singularity),
            ..SettingsLayer::default()
        },
        probe.clone(),
    );

    let err = runner.resolve("blast").await.unwrap_err();
    let ResolveError::BackendUnavailable {
        forced, attempts, ..
    } = &err;
    assert_eq!(*forced, Some(ExecutionMode::Singularity));
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].mode, ExecutionMode::Singularity);
    assert_eq!(probe.calls(ExecutionMode::Native), 0);
    assert_eq!(probe.calls(ExecutionMode::Docker), 0);
    Ok(())
}

#[tokio::test]
async fn per_tool_forced_mode_overrides_global_preference() -> Result<()> {
    let probe = Arc::new(
        ScriptedProbe::new()
            .native("/usr/bin/bwa")
            .container(ExecutionMode::Docker, "/usr/bin/docker", "biocontainers/bwa"),
    );
    let mut layer = prefer(&[ExecutionMode::Native, ExecutionMode::Docker]);
    layer.tools.insert(
        "bwa".into(),
        bio_exec::ToolSettings {
            execution_mode: Some(ExecutionMode::Docker),
            ..Default::default()
        },
    );
    let runner = runner(layer, probe);
    assert_eq!(runner.resolve("bwa").await?.mode, ExecutionMode::Docker);
    // Other tools still follow the global order.
    assert_eq!(runner.resolve("blast").await?.mode, ExecutionMode::Native);
    Ok(())
}

#[tokio::test]
async fn force_container_skips_host_modes() -> Result<()> {
    let probe = Arc::new(
        ScriptedProbe::new()
            .native("/usr/bin/blastn")
            .container(ExecutionMode::Singularity, "/usr/bin/apptainer", "docker://biocontainers/blast:2.15.0"),
    );
    let runner = runner(
        SettingsLayer {
            force_container: Some(true),
            ..SettingsLayer::default()
        },
        probe.clone(),
    );
    assert_eq!(runner.resolve("blast").await?.mode, ExecutionMode::Singularity);
    assert_eq!(probe.calls(ExecutionMode::Native), 0);
    Ok(())
}

#[tokio::test]
async fn resolution_is_deterministic_and_cached() -> Result<()> {
    let probe = Arc::new(ScriptedProbe::new().module(&["blast+"]));
    let runner = runner(prefer(&[ExecutionMode::Native, ExecutionMode::Module]), probe.clone());

    let first = runner.resolve("blast").await?;
    let second = runner.resolve("blast").await?;
    assert_eq!(first, second);
    assert_eq!(probe.calls(ExecutionMode::Native), 1);
    assert_eq!(probe.calls(ExecutionMode::Module), 1);

    runner.reprobe().await;
    let third = runner.resolve("blast").await?;
    assert_eq!(first, third);
    assert_eq!(probe.calls(ExecutionMode::Module), 2);
    Ok(())
}

#[tokio::test]
async fn unavailable_error_lists_every_attempt() -> Result<()> {
    let runner = runner(
        prefer(&[ExecutionMode::Native, ExecutionMode::Lmod, ExecutionMode::Docker]),
        Arc::new(ScriptedProbe::new()),
    );
    let err = runner.resolve("blast").await.unwrap_err();
    let modes: Vec<_> = err.attempts().iter().map(|a| a.mode).collect();
    assert_eq!(
        modes,
        vec![ExecutionMode::Native, ExecutionMode::Lmod, ExecutionMode::Docker]
    );
    assert!(err.to_string().contains("lmod: lmod not set up for 'blast'"));
    Ok(())
}
