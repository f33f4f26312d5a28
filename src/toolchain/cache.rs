use std::fs;

use camino::Utf8PathBuf;

use super::{Layout, Precacher, ToolError, quote};

/// Pre-caches templates and inline SVG images into AngularJS
/// `$templateCache` modules written to `<tmp>/<bundle>/templates.js` and
/// `<tmp>/<bundle>/images.js`.
#[derive(Debug, Clone)]
pub struct AngularCache {
    pub tmp: Utf8PathBuf,
}

impl AngularCache {
    pub fn new(layout: &Layout) -> Self {
        Self {
            tmp: layout.tmp.clone(),
        }
    }
}

impl Default for AngularCache {
    fn default() -> Self {
        Self::new(&Layout::default())
    }
}

fn render(files: &[Utf8PathBuf], module: &str) -> Result<String, ToolError> {
    let mut out = format!(
        "angular.module({}).run(['$templateCache', function ($templateCache) {{\n",
        quote(module)
    );

    for file in files {
        let text = fs::read_to_string(file)?;
        out.push_str(&format!(
            "  $templateCache.put({}, {});\n",
            quote(file.as_str()),
            quote(&text)
        ));
    }

    out.push_str("}]);\n");
    Ok(out)
}

impl AngularCache {
    fn write(&self, files: &[Utf8PathBuf], bundle: &str, path: Utf8PathBuf) -> Result<Utf8PathBuf, ToolError> {
        let text = render(files, bundle)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, text)?;

        tracing::info!("cached {} files into {}", files.len(), path);
        Ok(path)
    }

    pub fn templates_module(&self, bundle: &str) -> Utf8PathBuf {
        self.tmp.join(bundle).join("templates.js")
    }

    pub fn images_module(&self, bundle: &str) -> Utf8PathBuf {
        self.tmp.join(bundle).join("images.js")
    }
}

impl Precacher for AngularCache {
    fn templates(&self, files: &[Utf8PathBuf], bundle: &str) -> anyhow::Result<()> {
        self.write(files, bundle, self.templates_module(bundle))?;
        Ok(())
    }

    fn images(&self, files: &[Utf8PathBuf], bundle: &str) -> anyhow::Result<()> {
        self.write(files, bundle, self.images_module(bundle))?;
        Ok(())
    }
}
