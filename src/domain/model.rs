use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Port the runtime image listens on. Plain HTTP only.
pub const SERVE_PORT: u16 = 80;

/// Where the asset bundle is re-rooted inside the runtime filesystem.
pub const SERVE_ROOT: &str = "/srv";

/// Build-context inputs consumed by the Asset Builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInputs {
    pub context_root: PathBuf,
    pub lock_file: PathBuf,
    pub manifest: PathBuf,
    pub entry_file: PathBuf,
    pub source_dir: PathBuf,
}

impl SourceInputs {
    /// 使用預設專案佈局 (Cargo.lock, Cargo.toml, index.html, src/)
    pub fn new(context_root: impl Into<PathBuf>) -> Self {
        Self {
            context_root: context_root.into(),
            lock_file: PathBuf::from("Cargo.lock"),
            manifest: PathBuf::from("Cargo.toml"),
            entry_file: PathBuf::from("index.html"),
            source_dir: PathBuf::from("src"),
        }
    }

    pub fn with_entry_file(mut self, entry_file: impl Into<PathBuf>) -> Self {
        self.entry_file = entry_file.into();
        self
    }

    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    pub fn lock_file_path(&self) -> PathBuf {
        self.context_root.join(&self.lock_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.context_root.join(&self.manifest)
    }

    pub fn entry_file_path(&self) -> PathBuf {
        self.context_root.join(&self.entry_file)
    }

    pub fn source_dir_path(&self) -> PathBuf {
        self.context_root.join(&self.source_dir)
    }

    /// Name of the entry file as it appears in the output bundle.
    pub fn entry_file_name(&self) -> PathBuf {
        self.entry_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.entry_file.clone())
    }
}

/// How the external bundler is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOptions {
    pub bundler: String,
    pub dist_dir: PathBuf,
    pub release: bool,
    pub wasm_target: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            bundler: "trunk".to_string(),
            dist_dir: PathBuf::from("dist"),
            release: true,
            wasm_target: "wasm32-unknown-unknown".to_string(),
        }
    }
}

/// One file of an asset bundle, relative to the bundle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    pub path: PathBuf,
    pub size: u64,
}

/// The directory tree produced by the Asset Builder.
///
/// Construction goes through [`crate::core::bundle::scan`], which enforces
/// that the tree is non-empty and contains the entry file. There are no
/// mutating methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetBundle {
    root: PathBuf,
    entry_file: PathBuf,
    files: Vec<BundleFile>,
    total_bytes: u64,
    digest: String,
}

impl AssetBundle {
    pub(crate) fn from_parts(
        root: PathBuf,
        entry_file: PathBuf,
        files: Vec<BundleFile>,
        digest: String,
    ) -> Self {
        let total_bytes = files.iter().map(|f| f.size).sum();
        Self {
            root,
            entry_file,
            files,
            total_bytes,
            digest,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_file(&self) -> &Path {
        &self.entry_file
    }

    pub fn entry_path(&self) -> PathBuf {
        self.root.join(&self.entry_file)
    }

    /// Files sorted by relative path.
    pub fn files(&self) -> &[BundleFile] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// SHA-256 over every relative path and its content.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    Disabled,
}

/// Runtime parameters of the serving process. None of them can be changed
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServingConfiguration {
    bind_host: IpAddr,
    port: u16,
    root: PathBuf,
    browse: bool,
    tls: TlsMode,
}

impl ServingConfiguration {
    pub fn fixed() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: SERVE_PORT,
            root: PathBuf::from(SERVE_ROOT),
            browse: true,
            tls: TlsMode::Disabled,
        }
    }

    pub fn bind_host(&self) -> IpAddr {
        self.bind_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn browse(&self) -> bool {
        self.browse
    }

    pub fn tls(&self) -> TlsMode {
        self.tls
    }

    /// Listener spec for the file server. An empty host binds all interfaces.
    pub fn listen_address(&self) -> String {
        format!(":{}", self.port)
    }

    /// The serve root as a path below `image_root` on the assembling host.
    pub fn root_within(&self, image_root: &Path) -> PathBuf {
        let relative = self.root.strip_prefix("/").unwrap_or(&self.root);
        image_root.join(relative)
    }

    /// Arguments for `caddy file-server`. No `--domain` is passed, so no
    /// certificate is provisioned and the listener stays plaintext.
    pub fn server_args(&self) -> Vec<String> {
        let mut args = vec![
            "file-server".to_string(),
            "--root".to_string(),
            self.root.display().to_string(),
            "--listen".to_string(),
            self.listen_address(),
        ];
        if self.browse {
            args.push("--browse".to_string());
        }
        args
    }
}

impl Default for ServingConfiguration {
    fn default() -> Self {
        Self::fixed()
    }
}

/// Package channel and server package to install into the runtime base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionPlan {
    pub package: String,
    /// Server binary, relative to the image root.
    pub binary: PathBuf,
    pub key_url: String,
    pub key_sha256: Option<String>,
    /// Keyring file, relative to the image root.
    pub keyring_path: PathBuf,
    /// APT source list file, relative to the image root.
    pub source_list_path: PathBuf,
    pub repo_url: String,
    pub suite: String,
    pub component: String,
}

impl ProvisionPlan {
    /// The one-line APT source entry, signed by the installed keyring.
    pub fn source_entry(&self) -> String {
        format!(
            "deb [signed-by=/{}] {} {} {}\n",
            self.keyring_path.display(),
            self.repo_url,
            self.suite,
            self.component
        )
    }

    /// Absolute path of the server binary inside the runtime filesystem.
    pub fn binary_in_image(&self) -> PathBuf {
        Path::new("/").join(&self.binary)
    }
}

impl Default for ProvisionPlan {
    fn default() -> Self {
        Self {
            package: "caddy".to_string(),
            binary: PathBuf::from("usr/bin/caddy"),
            key_url: "https://dl.cloudsmith.io/public/caddy/stable/gpg.key".to_string(),
            key_sha256: None,
            keyring_path: PathBuf::from("usr/share/keyrings/caddy-stable-archive-keyring.asc"),
            source_list_path: PathBuf::from("etc/apt/sources.list.d/caddy-stable.list"),
            repo_url: "https://dl.cloudsmith.io/public/caddy/stable/deb/debian".to_string(),
            suite: "any-version".to_string(),
            component: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionStep {
    InstallTrustKey,
    RegisterSource,
    RefreshIndex,
    InstallPackage,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 4] = [
        ProvisionStep::InstallTrustKey,
        ProvisionStep::RegisterSource,
        ProvisionStep::RefreshIndex,
        ProvisionStep::InstallPackage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProvisionStep::InstallTrustKey => "install-trust-key",
            ProvisionStep::RegisterSource => "register-source",
            ProvisionStep::RefreshIndex => "refresh-index",
            ProvisionStep::InstallPackage => "install-package",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: ProvisionStep,
    pub status: StepStatus,
}

/// Result of the Serving Image Assembler.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeImage {
    pub root: PathBuf,
    pub serve_root: PathBuf,
    pub bundle: AssetBundle,
    pub serving: ServingConfiguration,
    pub server_binary: PathBuf,
    pub provisioning: Vec<StepOutcome>,
}

impl RuntimeImage {
    /// argv of the single foreground process the image starts.
    pub fn entrypoint(&self) -> Vec<String> {
        let mut argv = vec![self.server_binary.display().to_string()];
        argv.extend(self.serving.server_args());
        argv
    }
}

/// {not-built} -> {built} -> {assembled}. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    NotBuilt,
    Built,
    Assembled,
}

impl PipelineState {
    pub fn next(self) -> Option<PipelineState> {
        match self {
            PipelineState::NotBuilt => Some(PipelineState::Built),
            PipelineState::Built => Some(PipelineState::Assembled),
            PipelineState::Assembled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub root: PathBuf,
    pub entry_file: PathBuf,
    pub file_count: usize,
    pub total_bytes: u64,
    pub digest: String,
}

impl From<&AssetBundle> for BundleSummary {
    fn from(bundle: &AssetBundle) -> Self {
        Self {
            root: bundle.root().to_path_buf(),
            entry_file: bundle.entry_file().to_path_buf(),
            file_count: bundle.file_count(),
            total_bytes: bundle.total_bytes(),
            digest: bundle.digest().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub root: PathBuf,
    pub serve_root: PathBuf,
    pub entrypoint: Vec<String>,
    pub provisioning: Vec<StepOutcome>,
}

impl From<&RuntimeImage> for ImageSummary {
    fn from(image: &RuntimeImage) -> Self {
        Self {
            root: image.root.clone(),
            serve_root: image.serve_root.clone(),
            entrypoint: image.entrypoint(),
            provisioning: image.provisioning.clone(),
        }
    }
}

/// Record of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub build_duration_ms: u64,
    pub assemble_duration_ms: Option<u64>,
    pub bundle: BundleSummary,
    pub image: Option<ImageSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serving_configuration_is_fixed() {
        let serving = ServingConfiguration::fixed();
        assert_eq!(serving.port(), 80);
        assert!(serving.bind_host().is_unspecified());
        assert!(serving.browse());
        assert_eq!(serving.tls(), TlsMode::Disabled);
        assert_eq!(serving.root(), Path::new("/srv"));
        assert_eq!(serving.socket_addr().to_string(), "0.0.0.0:80");
    }

    #[test]
    fn test_server_args_enable_browsing_without_domain() {
        let args = ServingConfiguration::fixed().server_args();
        assert_eq!(
            args,
            vec!["file-server", "--root", "/srv", "--listen", ":80", "--browse"]
        );
        assert!(!args.iter().any(|a| a == "--domain"));
    }

    #[test]
    fn test_root_within_image() {
        let serving = ServingConfiguration::fixed();
        assert_eq!(
            serving.root_within(Path::new("/tmp/image")),
            PathBuf::from("/tmp/image/srv")
        );
        assert_eq!(serving.root_within(Path::new("/")), PathBuf::from("/srv"));
    }

    #[test]
    fn test_state_transitions_are_one_way() {
        assert_eq!(PipelineState::NotBuilt.next(), Some(PipelineState::Built));
        assert_eq!(PipelineState::Built.next(), Some(PipelineState::Assembled));
        assert_eq!(PipelineState::Assembled.next(), None);
    }

    #[test]
    fn test_source_entry_is_signed_by_keyring() {
        let plan = ProvisionPlan::default();
        let entry = plan.source_entry();
        assert!(entry.starts_with(
            "deb [signed-by=/usr/share/keyrings/caddy-stable-archive-keyring.asc] "
        ));
        assert!(entry.ends_with("any-version main\n"));
        assert_eq!(plan.binary_in_image(), PathBuf::from("/usr/bin/caddy"));
    }

    #[test]
    fn test_entry_file_name_drops_directories() {
        let inputs = SourceInputs::new("/work").with_entry_file("web/index.html");
        assert_eq!(inputs.entry_file_name(), PathBuf::from("index.html"));
        assert_eq!(inputs.entry_file_path(), PathBuf::from("/work/web/index.html"));
    }
}
