use crate::config::Settings;
use crate::deadline::Deadline;
use crate::progress::Progress;
use crate::store::ResourceStore;

/*
 * Everything a workflow step needs: where to read and write, how long it
 * may take and where to report progress. One per command invocation.
 */
pub struct WorkflowCtx<'a> {
    pub store: &'a dyn ResourceStore,
    pub settings: &'a Settings,
    pub deadline: Deadline,
    pub progress: Progress,
}

impl<'a> WorkflowCtx<'a> {

    pub fn new(store: &'a dyn ResourceStore, settings: &'a Settings, deadline: Deadline, progress: Progress) -> Self {
	Self{
	    store: store,
	    settings: settings,
	    deadline: deadline,
	    progress: progress,
	}
    }
}
