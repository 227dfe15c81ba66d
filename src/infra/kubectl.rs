//! kubectl 参数构造

use crate::domain::kube::KubeProvider;

fn cluster_args(provider: Option<&KubeProvider>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(provider) = provider {
        if let Some(kubeconfig) = &provider.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        if let Some(context) = &provider.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
    }
    args
}

/// `kubectl apply -f -`，manifest 从 stdin 读入
pub fn apply_args(provider: Option<&KubeProvider>) -> Vec<String> {
    let mut args = cluster_args(provider);
    args.extend(["apply", "-f", "-"].map(String::from));
    args
}

/// `kubectl delete -f -`，对象不存在时不报错
pub fn delete_args(provider: Option<&KubeProvider>) -> Vec<String> {
    let mut args = cluster_args(provider);
    args.extend(["delete", "--ignore-not-found", "-f", "-"].map(String::from));
    args
}
