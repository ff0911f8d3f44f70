use serde::Deserialize;

/// Who is asking, passed explicitly with each request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestContext {
    pub userid: String,
    pub isediting: bool,
}

impl RequestContext {
    pub fn new(userid: impl Into<String>) -> Self {
        Self {
            userid: userid.into(),
            isediting: false,
        }
    }

    pub fn editing(mut self) -> Self {
        self.isediting = true;
        self
    }
}
