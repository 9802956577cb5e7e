// Application state for HTTP handlers
use crate::application::channel_repository::ChannelRepository;
use crate::application::config_dialogue::ConfigDialogueController;
use crate::application::report_service::ReportService;
use std::sync::Arc;

pub struct AppState {
    pub channels: Arc<dyn ChannelRepository>,
    pub dialogue: ConfigDialogueController,
    pub reports: ReportService,
}
