use crate::config::build_spec::Proxies;
use crate::core::interceptor::{escape, resolve_repo_name};
use crate::domain::model::{ServiceRole, ServiceSet};

pub const PROXY_SCRIPT_FILE: &str = "proxy.sh";

/// Characters the shell still interprets inside double quotes.
const SHELL_SPECIALS: &[char] = &['\\', '"', '$', '`'];

/// Shell snippet a build step sources to route pip (and optionally Go)
/// through the proxies. Tracing is switched off while the credentials are
/// exported and the caller's `-e`/`-x` flags are restored afterwards.
pub fn render_proxy_script(services: &ServiceSet, proxies: &Proxies, repo_name: &str) -> String {
    let mut script = String::from("#!/bin/sh\n_constructor_flags=\"$-\"\nset +ex\n\n");

    let repo_manager = services.get(ServiceRole::RepoManager);
    for (key, value) in repo_manager.custom_env() {
        if key.starts_with("PIP_") {
            script.push_str(&export_line(key, &resolve_repo_name(value, repo_name)));
        }
    }
    script.push_str(&export_line("PIP_NO_BINARY", ":all:"));

    if proxies.golang {
        if let Some(goproxy) = services.get(ServiceRole::Proxy).custom_env().get("GOPROXY") {
            script.push_str(&export_line("GOPROXY", goproxy));
        }
    }

    script.push_str(
        "\ncase \"$_constructor_flags\" in *e*) set -e ;; esac\n\
         case \"$_constructor_flags\" in *x*) set -x ;; esac\n\
         unset _constructor_flags\n",
    );
    script
}

fn export_line(key: &str, value: &str) -> String {
    format!("export {}=\"{}\"\n", key, escape(value, SHELL_SPECIALS))
}
