//! Remote install scripts.
//!
//! Every script is safe to run again: charts are applied with
//! `helm upgrade --install` and manifests with `kubectl apply`. Secrets are
//! never inlined; a password is read on the host from a parameter reference.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byoc_config::model::ArgoCd;

/// Name of the GitOps controller addon.
pub const ARGOCD: &str = "argocd";

/// Addons that can be installed on a cluster.
pub const KNOWN_ADDONS: &[&str] = &[ARGOCD];

const ARGO_HELM_REPO: &str = "https://argoproj.github.io/argo-helm";

/// Wrap a value in single quotes for the shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render a value as a double-quoted YAML scalar.
fn yaml_quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_owned())
}

/// Parameter holding the GitOps repository password for a tenant environment.
#[must_use]
pub fn repo_password_parameter(tenant_id: &str, environment: &str) -> String {
    format!("/byoc/{tenant_id}/{environment}/argocd/repo-password")
}

/// Inputs for the GitOps controller install script.
#[derive(Debug, Clone, Copy)]
pub struct ArgoCdScript<'a> {
    /// Tenant the cluster belongs to.
    pub tenant_id: &'a str,
    /// Cluster to install into.
    pub cluster_name: &'a str,
    /// Cluster region.
    pub region: &'a str,
    /// Resolved addon settings.
    pub argocd: &'a ArgoCd,
    /// Parameter holding the repository password, if one was stored.
    pub password_parameter: Option<&'a str>,
}

impl ArgoCdScript<'_> {
    /// Render the script.
    #[must_use]
    pub fn render(&self) -> String {
        let argocd = self.argocd;
        let controller_replicas = if argocd.ha_enabled { 2 } else { 1 };

        let mut lines: Vec<String> = vec![
            "#!/bin/bash".into(),
            "set -euo pipefail".into(),
            String::new(),
            r#"export PATH="/usr/local/bin:$PATH""#.into(),
            r#"export HOME="${HOME:-/root}""#.into(),
            r#"mkdir -p "$HOME/.kube""#.into(),
            r#"export KUBECONFIG="$HOME/.kube/config""#.into(),
            String::new(),
            format!("CLUSTER_NAME={}", shell_quote(self.cluster_name)),
            format!("REGION={}", shell_quote(self.region)),
            format!("CHART_VERSION={}", shell_quote(&argocd.chart_version)),
            String::new(),
            r#"echo "==> Configuring kubectl for $CLUSTER_NAME in $REGION...""#.into(),
            r#"aws eks update-kubeconfig --name "$CLUSTER_NAME" --region "$REGION""#.into(),
            "kubectl get nodes".into(),
            String::new(),
            format!("helm repo add argo {ARGO_HELM_REPO} --force-update"),
            "helm repo update".into(),
            String::new(),
            r#"echo "==> Installing argocd (chart version $CHART_VERSION)...""#.into(),
            "helm upgrade --install argocd argo/argo-cd \\".into(),
            "  --namespace argocd --create-namespace \\".into(),
            r#"  --version "$CHART_VERSION" \"#.into(),
            format!("  --set server.replicas={} \\", argocd.server_replicas),
            format!("  --set repoServer.replicas={} \\", argocd.repo_server_replicas),
            format!("  --set 'redis-ha.enabled={}' \\", argocd.ha_enabled),
            format!("  --set controller.replicas={controller_replicas} \\"),
            "  --wait --timeout 5m".into(),
            String::new(),
        ];

        if let Some(ref repo) = argocd.repository {
            let type_b64 = STANDARD.encode("git");
            let url_b64 = STANDARD.encode(&repo.url);
            let user_b64 = STANDARD.encode(&repo.username);

            lines.push(r#"echo "==> Applying repository credentials...""#.into());
            match self.password_parameter {
                Some(parameter) => {
                    lines.push(format!(
                        r#"REPO_PASSWORD=$(aws ssm get-parameter --name {} --with-decryption --region "$REGION" --query Parameter.Value --output text)"#,
                        shell_quote(parameter)
                    ));
                    lines.push(r#"PASS_B64=$(echo -n "$REPO_PASSWORD" | base64 -w0)"#.into());
                    lines.push("unset REPO_PASSWORD".into());
                    lines.push("kubectl apply -f - <<REPO_CREDS_EOF".into());
                }
                None => lines.push("kubectl apply -f - <<'REPO_CREDS_EOF'".into()),
            }
            lines.extend(
                [
                    "apiVersion: v1",
                    "kind: Secret",
                    "metadata:",
                    "  name: repo-creds",
                    "  namespace: argocd",
                    "  labels:",
                    "    argocd.argoproj.io/secret-type: repo-creds",
                    "data:",
                ]
                .map(String::from),
            );
            lines.push(format!("  type: {type_b64}"));
            lines.push(format!("  url: {url_b64}"));
            lines.push(format!("  username: {user_b64}"));
            if self.password_parameter.is_some() {
                lines.push("  password: $PASS_B64".into());
            }
            lines.push("REPO_CREDS_EOF".into());
            lines.push(String::new());

            if !argocd.root_app_path.is_empty() {
                lines.push(r#"echo "==> Applying root application...""#.into());
                lines.push("kubectl apply -f - <<'ROOT_APP_EOF'".into());
                lines.extend(
                    [
                        "apiVersion: argoproj.io/v1alpha1",
                        "kind: Application",
                        "metadata:",
                    ]
                    .map(String::from),
                );
                lines.push(format!("  name: {}-root-app", self.tenant_id));
                lines.extend(
                    [
                        "  namespace: argocd",
                        "spec:",
                        "  project: default",
                        "  source:",
                    ]
                    .map(String::from),
                );
                lines.push(format!("    repoURL: {}", yaml_quote(&repo.url)));
                lines.push("    targetRevision: HEAD".into());
                lines.push(format!("    path: {}", yaml_quote(&argocd.root_app_path)));
                lines.extend(
                    [
                        "    directory:",
                        "      recurse: true",
                        "  destination:",
                        "    server: https://kubernetes.default.svc",
                        "    namespace: argocd",
                        "  syncPolicy:",
                        "    automated:",
                        "      prune: true",
                        "      selfHeal: true",
                        "ROOT_APP_EOF",
                        "",
                    ]
                    .map(String::from),
                );
            }
        }

        lines.extend(
            [
                "kubectl get pods -n argocd",
                r#"echo "==> argocd installation complete""#,
            ]
            .map(String::from),
        );

        lines.join("\n")
    }
}
