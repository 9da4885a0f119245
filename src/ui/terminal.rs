use parking_lot::Mutex;
use tracing::{debug, info};

use crate::map::{MapView, MarkerGroup, Popup};
use crate::notify::{Category, Notification, NotificationSink};
use crate::ui::render::{EmptyState, FilterTag, OfferCard, OfferModal, Renderer};

/// Prints the dashboard to stdout.
pub struct TerminalRenderer {
    /// Number of the next card, so appended cards continue the list.
    next_card: Mutex<usize>,
    /// Print every marker group instead of a one-line map summary.
    list_markers: bool,
}

impl TerminalRenderer {
    pub fn new(list_markers: bool) -> Self {
        Self {
            next_card: Mutex::new(1),
            list_markers,
        }
    }

    fn print_cards(&self, cards: &[OfferCard]) {
        let mut next = self.next_card.lock();
        for card in cards {
            println!("{}. {}", *next, card.title);
            if !card.location.is_empty() {
                println!("   📍 {}", card.location);
            }
            println!("   💰 {} · {}", card.price, card.scraper);
            println!("   🕒 Aktualizováno: {}", card.updated);
            println!("   🔗 {}", card.link);
            println!();
            *next += 1;
        }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Renderer for TerminalRenderer {
    fn render_list(&self, cards: &[OfferCard]) {
        *self.next_card.lock() = 1;
        self.print_cards(cards);
    }

    fn append_cards(&self, cards: &[OfferCard]) {
        self.print_cards(cards);
    }

    fn render_empty(&self, state: &EmptyState) {
        println!("{}", state.title);
        println!("   {}", state.hint);
        if state.retry {
            println!("   (spusťte příkaz znovu pro nové načtení)");
        }
    }

    fn render_error(&self, message: &str, recoverable: bool) {
        eprintln!("❌ {message}");
        if recoverable {
            eprintln!("   Zkuste to znovu.");
        }
    }

    fn set_loading(&self, loading: bool) {
        debug!(loading, "Loading state changed");
    }

    fn set_active_count(&self, text: &str) {
        println!("Aktivní nabídky: {text}");
    }

    fn set_active_filters(&self, tags: &[FilterTag]) {
        if tags.is_empty() {
            return;
        }
        let tags: Vec<String> = tags.iter().map(|tag| format!("{}: {}", tag.label, tag.value)).collect();
        println!("Filtry: {}", tags.join(", "));
    }

    fn set_panel_title(&self, title: &str) {
        println!("== {title} ==");
    }

    fn render_map(&self, markers: &[MarkerGroup], view: &MapView) {
        let center = view.center();
        info!(
            "🗺️ {} markers, centre {:.4},{:.4}, zoom {}",
            markers.len(),
            center.lat,
            center.lng,
            view.zoom()
        );
        if !self.list_markers {
            return;
        }
        for group in markers {
            println!(
                "[{:>3}] {} {}",
                group.count(),
                group.key,
                group.popup().header
            );
        }
    }

    fn show_popup(&self, popup: &Popup) {
        println!("📌 {} ({})", popup.header, popup.count_label);
        for item in &popup.items {
            println!("   • {} | {} | {}", item.title, item.price, item.source);
            println!("     {}", item.link);
        }
    }

    fn show_modal(&self, modal: &OfferModal) {
        let card = &modal.card;
        println!("{}", card.title);
        println!("{}", "-".repeat(card.title.chars().count().min(80)));
        println!("📍 {}", card.location);
        println!("💰 {}", card.price);
        println!("🕒 Aktualizováno: {}", card.updated);
        println!();
        println!("{}", modal.description);
        println!();
        for image in &modal.images {
            println!("🖼️  {image}");
        }
        println!("🔗 {}", card.link);
    }

    fn set_processing_indicator(&self, text: Option<&str>) {
        match text {
            Some(text) => println!("⏳ {text}"),
            None => debug!("Processing indicator hidden"),
        }
    }

    fn set_scraper_options(&self, scrapers: &[String]) {
        debug!(count = scrapers.len(), "Scraper filter options: {}", scrapers.join(", "));
    }
}

impl NotificationSink for TerminalRenderer {
    fn show(&self, notification: &Notification) {
        let icon = match notification.category {
            Category::Success => "✅",
            Category::Warning => "⚠️",
            Category::Error => "❌",
            Category::Info | Category::Default => "ℹ️",
        };
        println!("{icon} {}", notification.message);
    }
}
