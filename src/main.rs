use clap::Parser;
use lxsh::compile::{format_library, format_listing, listing};
use lxsh::passes::{MinifyMap, MinifyOptions};
use lxsh::{compile, CompileOptions, Error, Listing, Source, SystemHost};
use regex_lite::Regex;
use std::io::{Read, Write};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lxsh")]
#[command(about = "Compile, debashify and minify shell scripts")]
#[command(version)]
struct Cli {
    /// Script files, concatenated in order (stdin when none)
    #[arg()]
    files: Vec<String>,

    /// Write the output to a file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Enable every minification
    #[arg(short = 'm', long = "minify")]
    minify: bool,

    #[arg(long = "minify-quotes")]
    minify_quotes: bool,

    #[arg(long = "minify-var")]
    minify_var: bool,

    #[arg(long = "minify-fct")]
    minify_fct: bool,

    /// Delete unused variables and functions
    #[arg(long = "remove-unused")]
    remove_unused: bool,

    /// Only render the output without optional whitespace
    #[arg(long = "minimize")]
    minimize: bool,

    /// Translate bash constructs to POSIX sh
    #[arg(long = "debashify")]
    debashify: bool,

    /// Parse as bash regardless of the shebang
    #[arg(long = "bash", conflicts_with = "sh")]
    bash: bool,

    /// Parse as POSIX sh regardless of the shebang
    #[arg(long = "sh")]
    sh: bool,

    /// Regex of variable names to leave alone
    #[arg(long = "exclude-var", value_name = "REGEX")]
    exclude_var: Option<String>,

    /// Regex of function names to leave alone
    #[arg(long = "exclude-fct", value_name = "REGEX")]
    exclude_fct: Option<String>,

    /// Allow renaming reserved variables such as PATH or IFS
    #[arg(long = "no-exclude-reserved")]
    no_exclude_reserved: bool,

    /// Apply the renames of a map file
    #[arg(long = "map-file", value_name = "FILE")]
    map_file: Option<String>,

    /// Write the applied renames to a map file
    #[arg(long = "output-map", value_name = "FILE")]
    output_map: Option<String>,

    /// Replace the shebang of the output
    #[arg(long = "shebang")]
    shebang: Option<String>,

    /// List variables with their occurrence counts
    #[arg(long = "list-var")]
    list_var: bool,

    #[arg(long = "list-var-def")]
    list_var_def: bool,

    #[arg(long = "list-var-call")]
    list_var_call: bool,

    #[arg(long = "list-fct")]
    list_fct: bool,

    #[arg(long = "list-cmd")]
    list_cmd: bool,

    /// List the support library functions
    #[arg(long = "list-lib")]
    list_lib: bool,

    /// Print listings as JSON
    #[arg(long = "json")]
    json: bool,
}

impl Cli {
    fn listing(&self) -> Option<Listing> {
        [
            (self.list_var, Listing::Var),
            (self.list_var_def, Listing::VarDef),
            (self.list_var_call, Listing::VarCall),
            (self.list_fct, Listing::Fct),
            (self.list_cmd, Listing::Cmd),
        ]
        .into_iter()
        .find(|(set, _)| *set)
        .map(|(_, kind)| kind)
    }

    fn compile_options(&self) -> lxsh::Result<CompileOptions> {
        let regex = |pattern: &Option<String>| -> lxsh::Result<Option<Regex>> {
            pattern
                .as_deref()
                .map(|p| {
                    Regex::new(&format!("^(?:{})$", p))
                        .map_err(|e| Error::Option(format!("invalid regex '{}': {}", p, e)))
                })
                .transpose()
        };
        let map = match &self.map_file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                Some(MinifyMap::parse(&text)?)
            }
            None => None,
        };
        let bash = match (self.bash, self.sh) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Ok(CompileOptions {
            bash,
            debashify: self.debashify,
            minify: MinifyOptions {
                quotes: self.minify || self.minify_quotes,
                var: self.minify || self.minify_var || map.is_some(),
                fct: self.minify || self.minify_fct || map.is_some(),
                remove_unused: self.minify || self.remove_unused,
                exclude_var: regex(&self.exclude_var)?,
                exclude_fct: regex(&self.exclude_fct)?,
                exclude_reserved: !self.no_exclude_reserved,
                map,
            },
            minimal: self.minimize,
            shebang: self.shebang.clone(),
        })
    }

    fn sources(&self) -> lxsh::Result<Vec<Source>> {
        if self.files.is_empty() {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| Error::io("-", e))?;
            return Ok(vec![Source {
                filename: "-".to_string(),
                text,
            }]);
        }
        self.files
            .iter()
            .map(|f| {
                let text = std::fs::read_to_string(f).map_err(|e| Error::io(f, e))?;
                Ok(Source {
                    filename: f.clone(),
                    text,
                })
            })
            .collect()
    }
}

fn run(cli: &Cli) -> lxsh::Result<()> {
    if cli.list_lib {
        print!("{}", format_library(cli.json));
        return Ok(());
    }
    let options = cli.compile_options()?;
    let sources = cli.sources()?;
    let mut host = SystemHost::new()?;
    let compiled = compile(&sources, &options, &mut host)?;

    if let Some(kind) = cli.listing() {
        print!("{}", format_listing(&listing(&compiled.script, kind), cli.json));
        return Ok(());
    }

    if let Some(path) = &cli.output_map {
        std::fs::write(path, compiled.map.to_string()).map_err(|e| Error::io(path, e))?;
    }
    match &cli.output {
        Some(path) => std::fs::write(path, &compiled.text).map_err(|e| Error::io(path, e))?,
        None => std::io::stdout()
            .write_all(compiled.text.as_bytes())
            .map_err(|e| Error::io("-", e))?,
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LXSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("lxsh: {}", e);
        if let Some(pe) = e.parse_error() {
            // offending line and caret
            if let Some((_, caret)) = pe.diagnostic().split_once('\n') {
                eprintln!("{}", caret);
            }
        }
        std::process::exit(1);
    }
}
