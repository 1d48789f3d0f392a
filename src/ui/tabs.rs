// Tab bar: Player / Favorites / History / Library / Playlists.
// Switching to one of the list tabs asks the app to reload that list.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Player,
    Favorites,
    History,
    Library,
    Playlists,
}

// Which backend list needs fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRefresh {
    Favorites,
    History,
    Library,
    Playlists,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Tab::Player,
        Tab::Favorites,
        Tab::History,
        Tab::Library,
        Tab::Playlists,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Player => "Player",
            Tab::Favorites => "Favorites",
            Tab::History => "History",
            Tab::Library => "Library",
            Tab::Playlists => "Playlists",
        }
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    // '1'..'5'
    pub fn from_digit(c: char) -> Option<Tab> {
        let n = c.to_digit(10)? as usize;
        n.checked_sub(1).and_then(|i| Tab::ALL.get(i).copied())
    }

    pub fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn refresh(self) -> Option<ListRefresh> {
        match self {
            Tab::Player => None,
            Tab::Favorites => Some(ListRefresh::Favorites),
            Tab::History => Some(ListRefresh::History),
            Tab::Library => Some(ListRefresh::Library),
            Tab::Playlists => Some(ListRefresh::Playlists),
        }
    }
}

#[derive(Debug, Default)]
pub struct TabController {
    active: Tab,
}

impl TabController {
    pub fn active(&self) -> Tab {
        self.active
    }

    // Returns the list to reload, if any. Re-selecting a list tab reloads it too.
    pub fn switch_to(&mut self, tab: Tab) -> Option<ListRefresh> {
        self.active = tab;
        tab.refresh()
    }

    pub fn cycle(&mut self) -> Option<ListRefresh> {
        self.switch_to(self.active.next())
    }
}
