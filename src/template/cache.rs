//! Startup-time template compilation.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use tracing::{debug, info, warn};

use super::{RenderContext, RenderError, TemplateError, functions};

const PAGE_SUFFIX: &str = ".page.html";
const FRAGMENT_SUFFIXES: [&str; 2] = [".layout.html", ".partial.html"];

/// One page, pre-parsed together with every layout and partial.
///
/// Each unit owns its own environment, so pages cannot see one another and
/// every page sees every shared fragment. Immutable after construction.
pub struct TemplateUnit {
    name: String,
    env: Environment<'static>,
}

impl TemplateUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes the page into a fresh buffer.
    ///
    /// Nothing leaves this function on failure: the partial output is
    /// dropped along with the buffer.
    pub fn render_to_buffer(&self, ctx: &RenderContext) -> Result<Vec<u8>, RenderError> {
        let execute = |source| RenderError::Execute { name: self.name.clone(), source };
        let tmpl = self.env.get_template(&self.name).map_err(execute)?;
        let mut buf = Vec::new();
        tmpl.render_to_write(ctx, &mut buf).map_err(execute)?;
        Ok(buf)
    }
}

impl std::fmt::Debug for TemplateUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateUnit").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Page name → compiled [`TemplateUnit`].
///
/// Built once before the server starts; there is no way to change it
/// afterwards, so it is shared between request tasks without locking.
#[derive(Debug)]
pub struct TemplateCache {
    pages: HashMap<String, TemplateUnit>,
}

impl TemplateCache {
    /// Compiles every `*.page.html` in `dir` with all `*.layout.html` and
    /// `*.partial.html` files from the same directory.
    ///
    /// The first file that cannot be read or parsed aborts the build.
    pub fn build(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        let io_err = |source| TemplateError::Io { path: dir.to_path_buf(), source };

        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(dir = %dir.display(), file = ?raw, "skipping template with non-UTF-8 name"),
            }
        }
        names.sort_unstable();

        let mut pages = Vec::new();
        let mut fragments = Vec::new();
        for name in names {
            let is_page = name.ends_with(PAGE_SUFFIX);
            let is_fragment = FRAGMENT_SUFFIXES.iter().any(|s| name.ends_with(s));
            if !is_page && !is_fragment {
                continue;
            }
            let path = dir.join(&name);
            let source = fs::read_to_string(&path)
                .map_err(|source| TemplateError::Io { path: path.clone(), source })?;
            if is_page {
                pages.push((name, source));
            } else {
                fragments.push((name, source));
            }
        }

        let cache = Self::from_sources(pages, fragments)?;
        info!(dir = %dir.display(), pages = cache.len(), "template cache built");
        Ok(cache)
    }

    /// Compiles in-memory `(name, source)` pairs.
    ///
    /// A fragment name used twice, or shared by a page and a fragment, is a
    /// [`TemplateError::Collision`].
    pub fn from_sources(
        pages: impl IntoIterator<Item = (String, String)>,
        fragments: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, TemplateError> {
        let fragments: Vec<(String, String)> = fragments.into_iter().collect();
        let mut seen = HashSet::new();
        for (name, _) in &fragments {
            if !seen.insert(name.as_str()) {
                return Err(TemplateError::Collision(name.clone()));
            }
        }

        let mut cache = HashMap::new();
        for (name, source) in pages {
            if seen.contains(name.as_str()) || cache.contains_key(&name) {
                return Err(TemplateError::Collision(name));
            }
            let unit = compile(&name, &source, &fragments)?;
            debug!(page = %name, fragments = fragments.len(), "compiled page");
            cache.insert(name, unit);
        }
        Ok(Self { pages: cache })
    }

    /// O(1) lookup by page name.
    pub fn get(&self, name: &str) -> Result<&TemplateUnit, TemplateError> {
        self.pages.get(name).ok_or_else(|| TemplateError::NotFound(name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn compile(
    name: &str,
    source: &str,
    fragments: &[(String, String)],
) -> Result<TemplateUnit, TemplateError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    functions::register(&mut env);

    let parse = |name: &str, source| TemplateError::Parse { name: name.to_owned(), source };
    env.add_template_owned(name.to_owned(), source.to_owned())
        .map_err(|e| parse(name, e))?;
    for (fragment, source) in fragments {
        env.add_template_owned(fragment.clone(), source.clone())
            .map_err(|e| parse(fragment, e))?;
    }
    Ok(TemplateUnit { name: name.to_owned(), env })
}
