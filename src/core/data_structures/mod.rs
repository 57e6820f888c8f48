/*!
 * Data Structures
 *
 * Specialized storage for the error path:
 * - Inline strings for error classifiers and short diagnostics
 *
 * Most diagnostic payloads fit in the inline capacity, so carrying them
 * costs a copy, not an allocation.
 */

mod inline_string;

pub use inline_string::InlineString;
