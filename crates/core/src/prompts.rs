use crate::error::ServiceError;
use crate::traits::PromptLoader;
use std::path::PathBuf;
use tracing::warn;

/// Alternate file names accepted for a prompt.
const ALIASES: [(&str, &str); 1] = [(
    "translate_json_fields_prompt.txt",
    "translate_json_fields.txt",
)];

#[derive(Debug, Clone)]
pub struct FilePromptLoader {
    dir: PathBuf,
}

impl FilePromptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.dir.join(name)];
        for (primary, alias) in ALIASES {
            if name == primary {
                paths.push(self.dir.join(alias));
            }
        }
        paths
    }
}

impl PromptLoader for FilePromptLoader {
    fn load_prompt(&self, name: &str) -> Result<String, ServiceError> {
        for path in self.candidates(name) {
            if path.is_file() {
                let text = std::fs::read_to_string(&path)?;
                return Ok(text.trim_start_matches('\u{feff}').to_string());
            }
        }
        Err(ServiceError::Prompt(self.dir.join(name).display().to_string()))
    }
}

/// Loads `name`, falling back to `default` when the prompt cannot be read.
pub fn load_prompt_or<L>(loader: &L, name: &str, default: &str) -> String
where
    L: PromptLoader + ?Sized,
{
    match loader.load_prompt(name) {
        Ok(text) => text,
        Err(error) => {
            warn!(prompt = name, %error, "prompt missing, using built-in default");
            default.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_prompt_or, FilePromptLoader};
    use crate::error::ServiceError;
    use crate::traits::PromptLoader;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn prompt_is_read_without_bom() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("prompt_en.txt"), "\u{feff}Extract the fields.")?;
        let loader = FilePromptLoader::new(dir.path());
        assert_eq!(loader.load_prompt("prompt_en.txt")?, "Extract the fields.");
        Ok(())
    }

    #[test]
    fn translate_prompt_alias_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("translate_json_fields.txt"), "Map to English keys.")?;
        let loader = FilePromptLoader::new(dir.path());
        assert_eq!(
            loader.load_prompt("translate_json_fields_prompt.txt")?,
            "Map to English keys."
        );
        Ok(())
    }

    #[test]
    fn missing_prompt_is_an_error_or_default() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let loader = FilePromptLoader::new(dir.path());
        assert!(matches!(
            loader.load_prompt("qa_bilingual.txt"),
            Err(ServiceError::Prompt(_))
        ));
        assert_eq!(load_prompt_or(&loader, "qa_bilingual.txt", "fallback"), "fallback");
        Ok(())
    }
}
