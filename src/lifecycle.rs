//! Container lifecycle management
//!
//! Owns the image and the per-configuration container: build-if-absent,
//! create (resolving name conflicts through a `ConflictResolver`), start,
//! run setup, and stop+remove.

use crate::config::Settings;
use crate::error::{MatrixError, MatrixResult};
use crate::log_writer::LogWriter;
use crate::orchestration::{ContainerRuntime, ContainerSpec, ImageHandle};
use crate::pipeline::command::{render, shell_command, CommandContext};
use crate::ui::{self, BuildProgress, UiContext};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What to do about an existing container with the requested name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Stop and remove the existing container, then create ours
    Replace,
    /// Leave the existing container alone and abort
    Decline,
    /// The operator's answer could not be understood
    Invalid(String),
}

impl ConflictDecision {
    /// Interpret an operator's answer to the replace prompt
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Self::Replace,
            "" | "n" | "no" => Self::Decline,
            _ => Self::Invalid(answer.trim().to_string()),
        }
    }
}

/// Decides how to handle a container name conflict
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, container: &str) -> MatrixResult<ConflictDecision>;
}

/// Always returns the same decision (`--yes`, CI)
#[derive(Debug, Clone)]
pub struct FixedResolver(pub ConflictDecision);

#[async_trait]
impl ConflictResolver for FixedResolver {
    async fn resolve(&self, _container: &str) -> MatrixResult<ConflictDecision> {
        Ok(self.0.clone())
    }
}

/// Asks the operator on the terminal
#[derive(Debug, Clone)]
pub struct TerminalResolver {
    ctx: UiContext,
}

impl TerminalResolver {
    pub fn new(ctx: UiContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ConflictResolver for TerminalResolver {
    async fn resolve(&self, container: &str) -> MatrixResult<ConflictDecision> {
        let message = format!(
            "Container {} already exists. Stop and remove it? [y/N]",
            container
        );
        match ui::ask_line(&self.ctx, &message).await? {
            Some(answer) => Ok(ConflictDecision::from_answer(&answer)),
            None => {
                ui::step_warn_hint(
                    &self.ctx,
                    &format!("Container {} already exists", container),
                    "not replacing it without a terminal",
                );
                Ok(ConflictDecision::Decline)
            }
        }
    }
}

/// Image and container operations for one run
pub struct ContainerManager<'a> {
    runtime: &'a dyn ContainerRuntime,
    resolver: &'a dyn ConflictResolver,
    settings: &'a Settings,
    ctx: &'a UiContext,
    /// Set while a container created by this manager has not been torn down
    holds_container: AtomicBool,
}

impl<'a> ContainerManager<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        resolver: &'a dyn ConflictResolver,
        settings: &'a Settings,
        ctx: &'a UiContext,
    ) -> Self {
        Self {
            runtime,
            resolver,
            settings,
            ctx,
            holds_container: AtomicBool::new(false),
        }
    }

    /// Whether a container this manager created may still exist
    pub fn holds_container(&self) -> bool {
        self.holds_container.load(Ordering::SeqCst)
    }

    pub fn runtime(&self) -> &'a dyn ContainerRuntime {
        self.runtime
    }

    /// Make sure the image exists locally, building it from the context if absent
    pub async fn ensure_image(&self, tag: &str) -> MatrixResult<ImageHandle> {
        if let Some(id) = self.runtime.image_id(tag).await? {
            debug!("Using local image {} ({})", tag, id);
            return Ok(ImageHandle {
                tag: tag.to_string(),
                id,
            });
        }

        let context_dir = &self.settings.image.context_dir;
        info!("Image {} not found, building from {}", tag, context_dir.display());

        let progress = BuildProgress::new(self.ctx, tag);
        let on_output = |line: String| progress.on_line(line);
        let result = self
            .runtime
            .build_image_with_progress(context_dir, tag, &on_output)
            .await;
        progress.finish();
        result?;

        let id = self
            .runtime
            .image_id(tag)
            .await?
            .ok_or_else(|| MatrixError::ImageMissing(tag.to_string()))?;

        Ok(ImageHandle {
            tag: tag.to_string(),
            id,
        })
    }

    /// Create the container, asking the resolver what to do on a name conflict
    pub async fn create_container(&self, spec: &ContainerSpec) -> MatrixResult<String> {
        let id = self.create_or_resolve(spec).await?;
        self.holds_container.store(true, Ordering::SeqCst);
        Ok(id)
    }

    async fn create_or_resolve(&self, spec: &ContainerSpec) -> MatrixResult<String> {
        match self.runtime.create(spec).await {
            Ok(id) => Ok(id),
            Err(MatrixError::ContainerNameConflict(name)) => {
                match self.resolver.resolve(&name).await? {
                    ConflictDecision::Replace => {
                        info!("Replacing existing container {}", name);
                        self.teardown(&name).await?;
                        self.runtime.create(spec).await
                    }
                    ConflictDecision::Decline => Err(MatrixError::ContainerConflictDeclined(name)),
                    ConflictDecision::Invalid(answer) => {
                        Err(MatrixError::ContainerConflictInvalidAnswer { name, answer })
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Start the container and run the setup command
    pub async fn start_and_setup(&self, container: &str) -> MatrixResult<()> {
        self.runtime.start(container).await?;

        let commands = &self.settings.commands;
        let ctx = CommandContext {
            source_dir: &self.settings.container.source_dir,
            build_dir: &self.settings.container.build_dir,
            jobs: commands.jobs,
            ..CommandContext::default()
        };
        let setup = render(&commands.setup, &ctx);
        let (code, _) = self.exec_to_debug_log(container, &setup).await?;

        if code != 0 {
            return Err(MatrixError::ContainerSetup {
                name: container.to_string(),
                code,
            });
        }
        Ok(())
    }

    /// Run a command whose output only matters for debugging.
    ///
    /// Returns the exit code and the number of bytes the command printed.
    pub(crate) async fn exec_to_debug_log(
        &self,
        container: &str,
        command: &str,
    ) -> MatrixResult<(i32, u64)> {
        let argv = shell_command(&self.settings.container.shell, command);
        let (tx, mut rx) = LogWriter::channel();

        let consume = async {
            let mut bytes = 0u64;
            while let Some(chunk) = rx.recv().await {
                bytes += chunk.len() as u64;
                for line in String::from_utf8_lossy(&chunk).lines() {
                    debug!("[{}] {}", container, line);
                }
            }
            bytes
        };

        let (code, bytes) = tokio::join!(self.runtime.exec(container, &argv, tx), consume);
        Ok((code?, bytes))
    }

    /// Stop and remove the container.
    ///
    /// A failed stop is logged and removal is forced anyway.
    pub async fn teardown(&self, container: &str) -> MatrixResult<()> {
        if let Err(e) = self.runtime.stop(container).await {
            warn!("Stopping {} failed, forcing removal: {}", container, e);
        }
        self.runtime.remove(container).await?;
        self.holds_container.store(false, Ordering::SeqCst);
        debug!("Container {} removed", container);
        Ok(())
    }
}
