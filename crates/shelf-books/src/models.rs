use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf::core::{FieldKey, PendingKeys, SyncEntity};
use shelf_api::{RecordId, SystemFields, Value};

/// Synced fields of a book record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BookKey {
    Title,
    Authors,
    Subtitle,
    GoogleBooksId,
    Isbn13,
    PageCount,
    PublicationDate,
    BookDescription,
    CoverImage,
    Notes,
    CurrentPage,
    CurrentPercentage,
    Rating,
    Languages,
    ReadState,
    StartedReading,
    FinishedReading,
    Sort,
}

impl FieldKey for BookKey {
    const ALL: &'static [Self] = &[
        BookKey::Title,
        BookKey::Authors,
        BookKey::Subtitle,
        BookKey::GoogleBooksId,
        BookKey::Isbn13,
        BookKey::PageCount,
        BookKey::PublicationDate,
        BookKey::BookDescription,
        BookKey::CoverImage,
        BookKey::Notes,
        BookKey::CurrentPage,
        BookKey::CurrentPercentage,
        BookKey::Rating,
        BookKey::Languages,
        BookKey::ReadState,
        BookKey::StartedReading,
        BookKey::FinishedReading,
        BookKey::Sort,
    ];

    fn remote_name(&self) -> &'static str {
        match self {
            BookKey::Title => "title",
            BookKey::Authors => "authors",
            BookKey::Subtitle => "subtitle",
            BookKey::GoogleBooksId => "googleBooksId",
            BookKey::Isbn13 => "isbn13",
            BookKey::PageCount => "pageCount",
            BookKey::PublicationDate => "publicationDate",
            BookKey::BookDescription => "bookDescription",
            BookKey::CoverImage => "coverImage",
            BookKey::Notes => "notes",
            BookKey::CurrentPage => "currentPage",
            BookKey::CurrentPercentage => "currentPercentage",
            BookKey::Rating => "rating",
            BookKey::Languages => "languages",
            BookKey::ReadState => "readState",
            BookKey::StartedReading => "startedReading",
            BookKey::FinishedReading => "finishedReading",
            BookKey::Sort => "sort",
        }
    }
}

/// Stored as an integer in the remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadState {
    Reading = 1,
    #[default]
    ToRead = 2,
    Finished = 3,
}

impl ReadState {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Reading progress as a rounded percentage, capped at 100
pub fn current_percentage(current_page: Option<i32>, page_count: Option<i32>) -> Option<i32> {
    let (current, total) = (current_page?, page_count?);
    if current > total {
        return Some(100);
    }
    if total <= 0 {
        return None;
    }
    Some((current as f64 / total as f64 * 100.0).round() as i32)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    id: RecordId,
    title: String,
    authors: Vec<String>,
    subtitle: Option<String>,
    google_books_id: Option<String>,
    isbn13: Option<i64>,
    page_count: Option<i32>,
    publication_date: Option<DateTime<Utc>>,
    book_description: Option<String>,
    cover_image: Option<Vec<u8>>,
    notes: Option<String>,
    current_page: Option<i32>,
    current_percentage: Option<i32>,
    rating: Option<i32>,
    languages: Vec<String>,
    read_state: ReadState,
    started_reading: Option<DateTime<Utc>>,
    finished_reading: Option<DateTime<Utc>>,
    sort: i32,

    #[serde(default)]
    pending_remote_update_keys: PendingKeys<BookKey>,
    #[serde(default)]
    system_fields: Option<SystemFields>,
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(RecordId::generate(), title)
    }

    pub fn with_id(id: RecordId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            authors: Vec::new(),
            subtitle: None,
            google_books_id: None,
            isbn13: None,
            page_count: None,
            publication_date: None,
            book_description: None,
            cover_image: None,
            notes: None,
            current_page: None,
            current_percentage: None,
            rating: None,
            languages: Vec::new(),
            read_state: ReadState::default(),
            started_reading: None,
            finished_reading: None,
            sort: 0,
            pending_remote_update_keys: PendingKeys::new(),
            system_fields: None,
        }
    }

    /// Books never saved remotely are created by a full insert, so only
    /// synced books track individual field edits.
    fn mark_pending(&mut self, changed: bool, key: BookKey) {
        if changed && self.system_fields.is_some() {
            self.pending_remote_update_keys.insert(key);
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let changed = replace_if_changed(&mut self.title, title.into());
        self.mark_pending(changed, BookKey::Title);
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn set_authors(&mut self, authors: Vec<String>) {
        let changed = replace_if_changed(&mut self.authors, authors);
        self.mark_pending(changed, BookKey::Authors);
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    pub fn set_subtitle(&mut self, subtitle: Option<String>) {
        let changed = replace_if_changed(&mut self.subtitle, subtitle);
        self.mark_pending(changed, BookKey::Subtitle);
    }

    pub fn google_books_id(&self) -> Option<&str> {
        self.google_books_id.as_deref()
    }

    pub fn set_google_books_id(&mut self, google_books_id: Option<String>) {
        let changed = replace_if_changed(&mut self.google_books_id, google_books_id);
        self.mark_pending(changed, BookKey::GoogleBooksId);
    }

    pub fn isbn13(&self) -> Option<i64> {
        self.isbn13
    }

    pub fn set_isbn13(&mut self, isbn13: Option<i64>) {
        let changed = replace_if_changed(&mut self.isbn13, isbn13);
        self.mark_pending(changed, BookKey::Isbn13);
    }

    pub fn page_count(&self) -> Option<i32> {
        self.page_count
    }

    pub fn set_page_count(&mut self, page_count: Option<i32>) {
        let changed = replace_if_changed(&mut self.page_count, page_count);
        self.mark_pending(changed, BookKey::PageCount);
        self.update_current_percentage();
    }

    pub fn publication_date(&self) -> Option<DateTime<Utc>> {
        self.publication_date
    }

    pub fn set_publication_date(&mut self, publication_date: Option<DateTime<Utc>>) {
        let changed = replace_if_changed(&mut self.publication_date, publication_date);
        self.mark_pending(changed, BookKey::PublicationDate);
    }

    pub fn book_description(&self) -> Option<&str> {
        self.book_description.as_deref()
    }

    pub fn set_book_description(&mut self, book_description: Option<String>) {
        let changed = replace_if_changed(&mut self.book_description, book_description);
        self.mark_pending(changed, BookKey::BookDescription);
    }

    pub fn cover_image(&self) -> Option<&[u8]> {
        self.cover_image.as_deref()
    }

    pub fn set_cover_image(&mut self, cover_image: Option<Vec<u8>>) {
        let changed = replace_if_changed(&mut self.cover_image, cover_image);
        self.mark_pending(changed, BookKey::CoverImage);
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        let changed = replace_if_changed(&mut self.notes, notes);
        self.mark_pending(changed, BookKey::Notes);
    }

    pub fn current_page(&self) -> Option<i32> {
        self.current_page
    }

    /// Also keeps `current_percentage` in step with the page
    pub fn set_current_page(&mut self, current_page: Option<i32>) {
        let changed = replace_if_changed(&mut self.current_page, current_page);
        self.mark_pending(changed, BookKey::CurrentPage);
        self.update_current_percentage();
    }

    pub fn current_percentage(&self) -> Option<i32> {
        self.current_percentage
    }

    fn update_current_percentage(&mut self) {
        let percentage = current_percentage(self.current_page, self.page_count);
        let changed = replace_if_changed(&mut self.current_percentage, percentage);
        self.mark_pending(changed, BookKey::CurrentPercentage);
    }

    pub fn rating(&self) -> Option<i32> {
        self.rating
    }

    pub fn set_rating(&mut self, rating: Option<i32>) {
        let changed = replace_if_changed(&mut self.rating, rating);
        self.mark_pending(changed, BookKey::Rating);
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn set_languages(&mut self, languages: Vec<String>) {
        let changed = replace_if_changed(&mut self.languages, languages);
        self.mark_pending(changed, BookKey::Languages);
    }

    pub fn read_state(&self) -> ReadState {
        self.read_state
    }

    pub fn set_read_state(&mut self, read_state: ReadState) {
        let changed = replace_if_changed(&mut self.read_state, read_state);
        self.mark_pending(changed, BookKey::ReadState);
    }

    pub fn started_reading(&self) -> Option<DateTime<Utc>> {
        self.started_reading
    }

    pub fn set_started_reading(&mut self, started_reading: Option<DateTime<Utc>>) {
        let changed = replace_if_changed(&mut self.started_reading, started_reading);
        self.mark_pending(changed, BookKey::StartedReading);
    }

    pub fn finished_reading(&self) -> Option<DateTime<Utc>> {
        self.finished_reading
    }

    pub fn set_finished_reading(&mut self, finished_reading: Option<DateTime<Utc>>) {
        let changed = replace_if_changed(&mut self.finished_reading, finished_reading);
        self.mark_pending(changed, BookKey::FinishedReading);
    }

    pub fn sort(&self) -> i32 {
        self.sort
    }

    pub fn set_sort(&mut self, sort: i32) {
        let changed = replace_if_changed(&mut self.sort, sort);
        self.mark_pending(changed, BookKey::Sort);
    }
}

fn strings(values: &[String]) -> Value {
    Value::Array(values.iter().map(|s| Value::from(s.as_str())).collect())
}

impl SyncEntity for Book {
    type Key = BookKey;

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn field_value(&self, key: BookKey) -> Value {
        match key {
            BookKey::Title => Value::from(self.title.as_str()),
            BookKey::Authors => strings(&self.authors),
            BookKey::Subtitle => Value::from(self.subtitle.clone()),
            BookKey::GoogleBooksId => Value::from(self.google_books_id.clone()),
            BookKey::Isbn13 => Value::from(self.isbn13),
            BookKey::PageCount => Value::from(self.page_count),
            BookKey::PublicationDate => Value::from(self.publication_date),
            BookKey::BookDescription => Value::from(self.book_description.clone()),
            BookKey::CoverImage => self.cover_image.clone().map_or(Value::Null, Value::Bytes),
            BookKey::Notes => Value::from(self.notes.clone()),
            BookKey::CurrentPage => Value::from(self.current_page),
            BookKey::CurrentPercentage => Value::from(self.current_percentage),
            BookKey::Rating => Value::from(self.rating),
            BookKey::Languages => strings(&self.languages),
            BookKey::ReadState => Value::from(self.read_state.as_i64()),
            BookKey::StartedReading => Value::from(self.started_reading),
            BookKey::FinishedReading => Value::from(self.finished_reading),
            BookKey::Sort => Value::from(self.sort),
        }
    }

    fn pending_remote_update_keys(&self) -> &PendingKeys<BookKey> {
        &self.pending_remote_update_keys
    }

    fn remove_pending_remote_update_keys(&mut self, keys: &[BookKey]) {
        self.pending_remote_update_keys.remove_all(keys);
    }

    /// Books never saved remotely go through the insert path instead
    fn has_pending_remote_updates(&self) -> bool {
        self.system_fields.is_some() && !self.pending_remote_update_keys.is_empty()
    }

    fn system_fields(&self) -> Option<&SystemFields> {
        self.system_fields.as_ref()
    }

    fn store_system_fields(&mut self, fields: SystemFields) {
        self.system_fields = Some(fields);
    }
}
