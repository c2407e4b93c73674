/// Build the caption-generation instruction for a single URL.
///
/// Pure formatting: the same URL always yields the same prompt. The JSON
/// shape is spelled out verbatim so the schema check downstream has a fair
/// chance of succeeding, and the model is told to skip markdown fencing
/// (it frequently ignores that, which is why the extractor exists).
pub fn build_prompt(url: &str) -> String {
    format!(
        r##"You are an expert LinkedIn social media assistant. A user has provided the following URL: {url}

If this is a YouTube video URL, leverage your search capabilities to thoroughly understand the video's *content*. This includes identifying its main topics, key arguments, core message, and significant takeaways. Do not rely solely on the video title or its immediate description. Base your captions on the actual substance and purpose of the video as discoverable through web search.
If it's an article, analyze its core message and key information.

Based on this analysis, generate TWO (2) distinct LinkedIn post caption options and relevant hashtags for each.

Each caption should be:
- Clear and concise.
- Engaging.
- Ideally under 200-250 characters, but prioritize impact and clarity.

Include 3-4 relevant and effective hashtags for each option.

Return your response as a JSON object string with the following structure:
{{
  "options": [
    {{
      "caption": "Your first generated caption here.",
      "hashtags": ["#hashtag1", "#hashtag2", "#hashtag3"]
    }},
    {{
      "caption": "Your second generated caption here.",
      "hashtags": ["#hashtagA", "#hashtagB", "#hashtagC"]
    }}
  ]
}}
Ensure the output is ONLY the JSON object string. Do not wrap it in markdown (e.g., ```json ... ```)."##
    )
}
