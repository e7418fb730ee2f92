pub mod line_rewriter;

pub use line_rewriter::{DocumentRewriter, RewriteRule, RewriteSummary};
