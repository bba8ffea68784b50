use roster_core::Category;

/// Announces a recorded attendance event to the person in front of the camera.
///
/// Voice output lives outside the daemon; implementations forward the greeting
/// wherever it should go.
pub trait Notifier {
    fn announce(&self, name: &str, category: Category);
}

/// Greeting text for a recorded event: morning for entries, evening for exits.
pub fn greeting(name: &str, category: Category) -> String {
    let part_of_day = match category {
        Category::Entry => "morning",
        Category::Exit => "evening",
    };
    format!("Good {part_of_day}, {name}")
}

/// Writes greetings to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn announce(&self, name: &str, category: Category) {
        tracing::info!(%category, greeting = %greeting(name, category), "announce");
    }
}
