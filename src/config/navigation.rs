//! Page index, parent memory and detached overlay pages

use tracing::{debug, warn};

use super::button::{Button, PageTarget};
use super::dial::Dial;
use super::page::Page;
use super::DeckConfig;

/// Which page a widget lives on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageId {
    Primary(usize),
    Detached(String),
}

impl DeckConfig {
    pub fn current_page_index(&self) -> usize {
        self.current_page_index
    }

    pub fn parent_page_index(&self) -> usize {
        self.parent_page_index
    }

    pub fn detached_page(&self) -> Option<&Page> {
        self.detached_page.as_ref()
    }

    pub fn is_detached(&self) -> bool {
        self.detached_page.is_some()
    }

    /// The visible page: the detached overlay if one is open, else the primary page
    pub fn current_page(&self) -> &Page {
        match &self.detached_page {
            Some(page) => page,
            None => &self.pages[self.current_page_index],
        }
    }

    pub fn current_page_mut(&mut self) -> &mut Page {
        match &mut self.detached_page {
            Some(page) => page,
            None => &mut self.pages[self.current_page_index],
        }
    }

    pub fn visible_page_id(&self) -> PageId {
        match &self.detached_page {
            Some(page) => PageId::Detached(page.name.clone()),
            None => PageId::Primary(self.current_page_index),
        }
    }

    /// Look up a page that may no longer be visible
    pub fn page(&self, id: &PageId) -> Option<&Page> {
        match id {
            PageId::Primary(index) => self.pages.get(*index),
            PageId::Detached(name) => self.detached_page.as_ref().filter(|p| &p.name == name),
        }
    }

    pub fn page_mut(&mut self, id: &PageId) -> Option<&mut Page> {
        match id {
            PageId::Primary(index) => self.pages.get_mut(*index),
            PageId::Detached(name) => self.detached_page.as_mut().filter(|p| &p.name == name),
        }
    }

    pub fn button(&self, key: usize) -> Option<&Button> {
        self.current_page().buttons.get(key)
    }

    pub fn dial(&self, index: usize) -> Option<&Dial> {
        self.current_page().dials.get(index)
    }

    pub fn dial_mut(&mut self, index: usize) -> Option<&mut Dial> {
        self.current_page_mut().dials.get_mut(index)
    }

    pub fn next_page_index(&self) -> usize {
        (self.current_page_index + 1) % self.pages.len()
    }

    pub fn previous_page_index(&self) -> usize {
        (self.current_page_index + self.pages.len() - 1) % self.pages.len()
    }

    pub fn next_page(&mut self) -> &Page {
        self.switch_primary(self.next_page_index());
        self.current_page()
    }

    pub fn previous_page(&mut self) -> &Page {
        self.switch_primary(self.previous_page_index());
        self.current_page()
    }

    /// Go to a primary page by index or name, or open an anonymous page as an overlay.
    /// Returns false when nothing matches.
    pub fn to_page(&mut self, target: &PageTarget) -> bool {
        match target {
            PageTarget::Index(index) => {
                if *index >= self.pages.len() {
                    warn!(
                        "Page index {} out of range ({} pages), staying put",
                        index,
                        self.pages.len()
                    );
                    return false;
                }
                self.switch_primary(*index);
                true
            }
            PageTarget::Name(name) => {
                if let Some(index) = self.pages.iter().position(|p| &p.name == name) {
                    self.switch_primary(index);
                    return true;
                }
                match self.anonymous_pages.iter().find(|p| &p.name == name).cloned() {
                    Some(page) => {
                        self.load_page_as_detached(page);
                        true
                    }
                    None => {
                        warn!("No page named {:?}", name);
                        false
                    }
                }
            }
        }
    }

    /// Show `page` over the current primary page; close-page returns to the page active now
    pub fn load_page_as_detached(&mut self, page: Page) {
        debug!("Opening detached page {:?}", page.name);
        self.parent_page_index = self.current_page_index;
        self.detached_page = Some(page);
    }

    pub fn close_detached_page(&mut self) {
        if let Some(page) = self.detached_page.take() {
            debug!("Closing detached page {:?}", page.name);
        }
    }

    /// Drop any overlay and return to the remembered parent page
    pub fn close_page(&mut self) -> &Page {
        self.close_detached_page();
        self.current_page_index = self.parent_page_index;
        self.current_page()
    }

    fn switch_primary(&mut self, index: usize) {
        self.close_detached_page();
        self.parent_page_index = self.current_page_index;
        self.current_page_index = index;
        debug!("Switched to page {} ({:?})", index, self.pages[index].name);
    }
}
