use colored::*;

/// Turns common compiler and linker diagnostics into a short hint.
pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    pub fn analyze(output: &str) -> Option<String> {
        // 1. Module interface not found (importer built before or without its interface)
        if output.contains("module file") && output.contains("not found")
            || output.contains("module '") && output.contains("' not found")
        {
            return Some(format!(
                "A {} could not be found.\nCheck that its interface unit exists, is not excluded from the scan, and declares {}.",
                "module interface".bold().yellow(),
                "export module <name>;".bold().green()
            ));
        }

        // 2. Main function missing (Specific Linker Error)
        if output.contains("undefined reference to `main'")
            || output.contains("undefined reference to 'main'")
        {
            return Some(format!(
                "An executable is missing its {} function.\nOnly units that define {} are linked as programs.",
                "main()".bold().yellow(),
                "int main(".bold().green()
            ));
        }

        // 3. Generic Missing Library (Linker Error)
        if output.contains("undefined reference to") || output.contains("undefined symbol") {
            return Some(format!(
                "It looks like a {} error.\nA module you import may need extra libraries: add them under {} in {}.",
                "Linker".bold().red(),
                "[module_ldflags]".bold().yellow(),
                "mb.toml".bold().yellow()
            ));
        }

        // 4. Missing Header (Compiler Error)
        if output.contains("fatal error: ") && output.contains("file not found")
            || output.contains("No such file or directory")
        {
            return Some(format!(
                "It looks like a {} error.\nAdd the directory with {} or under {} in mb.toml.",
                "Missing Header".bold().red(),
                "-I <dir>".bold().yellow(),
                "[build] include".bold().yellow()
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_not_found() {
        let err = "fatal error: module file 'build/pcm/net.pcm' not found";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("module interface"));
    }

    #[test]
    fn test_linker_error() {
        let err = "ld.lld: error: undefined symbol: SSL_new";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Linker"));
        assert!(msg.contains("module_ldflags"));
    }

    #[test]
    fn test_include_error() {
        let err = "fatal error: 'foo.h' file not found";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Missing Header"));
    }

    #[test]
    fn test_main_error() {
        let err = "undefined reference to `main'";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("main()"));
    }

    #[test]
    fn test_unrelated_output() {
        assert!(FeedbackAnalyzer::analyze("warning: unused variable 'x'").is_none());
    }
}
