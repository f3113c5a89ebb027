use colored::*;

/// Turns a failed discovery or compilation into a hint for the user.
pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    pub fn analyze(output: &str) -> Option<String> {
        // 1. The core itself is not reachable
        if output.contains("Arduino.h: no installed library")
            || output.contains("Arduino.h: No such file or directory")
        {
            return Some(format!(
                "The platform core headers were not found.\nCheck that {} points at the folder containing Arduino.h.",
                "[platform].core".bold().yellow()
            ));
        }

        // 2. Header no library provides
        if output.contains("no installed library provides this header") {
            let header = output.split(':').next().unwrap_or_default().trim();
            return Some(format!(
                "No installed library provides {}.\nInstall one into a user libraries folder, or list its folder under {} in inox.toml.\nUse {} to see which installed libraries match a header.",
                header.bold().yellow(),
                "[libraries].unmanaged".bold().yellow(),
                "inox libs --header <name>".bold().green()
            ));
        }

        // 3. Profile library not installed
        if output.contains("is attached to the project but is not installed") {
            return Some(format!(
                "Remove it from {} or install it into one of the libraries folders.",
                "[libraries].profile".bold().yellow()
            ));
        }

        // 4. Legacy library layout
        if output.contains("'arch' folder is no longer supported") {
            return Some(format!(
                "This library uses the old {} layout.\nUpdate the library to a release that ships a {} folder.",
                "arch/".bold().red(),
                "src/".bold().green()
            ));
        }

        // 5. Stale discovery cache
        if output.contains("internal error in library discovery cache") {
            return Some(format!(
                "The discovery cache is out of date.\nRun {} and build again.",
                "inox clean".bold().green()
            ));
        }

        None
    }
}
